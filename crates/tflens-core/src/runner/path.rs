use std::fmt::Display;

/// Rendering of the root module path.
pub const ROOT_MODULE_NAME: &str = "root";

/// Distinguishes instances of one module call produced by `count` or
/// `for_each`. `None` marks an unrepeated (or statically unresolvable)
/// call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    None,
    Index(i64),
    Key(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    pub key: InstanceKey,
}

/// Ordered sequence of call-name segments identifying a module instance.
/// Immutable once assigned; the lookup key across runners.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModulePath {
    segments: Vec<PathSegment>,
}

impl ModulePath {
    pub fn root() -> Self {
        ModulePath { segments: vec![] }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns a new path with one segment appended.
    pub fn join(&self, name: &str, key: InstanceKey) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment { name: name.to_string(), key });
        ModulePath { segments }
    }
}

impl Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return write!(f, "{}", ROOT_MODULE_NAME);
        }
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            write!(f, "module.{}", segment.name)?;
            match &segment.key {
                InstanceKey::None => {}
                InstanceKey::Index(index) => write!(f, "[{}]", index)?,
                InstanceKey::Key(key) => write!(f, "[\"{}\"]", key)?,
            }
        }
        Ok(())
    }
}
