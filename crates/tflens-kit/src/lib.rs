#[macro_use]
extern crate serde_derive;

pub use hcl_edit as hcl;
pub use indexmap;
pub use serde;
pub use serde_json;

pub mod helpers;
pub mod types;
