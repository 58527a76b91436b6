pub mod attr;
pub mod error;
pub mod ids;
pub mod name;
pub mod value;

pub use attr::{AttrFilter, Attribute, NumberFilter, SubkeyFilter};
pub use error::CoreError;
pub use ids::{EntityId, Version};
pub use value::AttrValue;
