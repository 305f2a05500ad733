pub mod annotations;
pub mod diagnostics;
pub mod position;
pub mod rules;
