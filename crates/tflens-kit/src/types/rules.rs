use std::fmt::Debug;

use strum::{Display, EnumString};

/// Severity level reported alongside every issue a rule produces.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

/// The capability contract the analyzer consumes from every rule. The core
/// never inspects rule logic, only this surface, when constructing issues.
pub trait Rule: Debug + Send + Sync {
    fn name(&self) -> &str;
    fn severity(&self) -> Severity;
    fn link(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Notice.to_string(), "NOTICE");
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARNING".parse::<Severity>(), Ok(Severity::Warning));
        assert!("INVALID".parse::<Severity>().is_err());
    }
}
