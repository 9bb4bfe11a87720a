use std::fmt;

/// Class discriminator of a remote entity.
///
/// The wire codes are `1 = Object`, `2 = Variable`, `4 = Method`. Any other
/// class (object types, views, data types...) is treated as an Object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NodeClass {
    #[default]
    Object,
    Variable,
    Method,
}

impl NodeClass {
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => NodeClass::Variable,
            4 => NodeClass::Method,
            _ => NodeClass::Object,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            NodeClass::Object => 1,
            NodeClass::Variable => 2,
            NodeClass::Method => 4,
        }
    }

    /// Whether entities of this class carry a value that must be read.
    pub fn has_value(self) -> bool {
        matches!(self, NodeClass::Variable)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeClass::Object => f.write_str("Object"),
            NodeClass::Variable => f.write_str("Variable"),
            NodeClass::Method => f.write_str("Method"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_class_defaults_to_object() {
        assert_eq!(NodeClass::from_code(1), NodeClass::Object);
        assert_eq!(NodeClass::from_code(2), NodeClass::Variable);
        assert_eq!(NodeClass::from_code(4), NodeClass::Method);
        assert_eq!(NodeClass::from_code(8), NodeClass::Object);
        assert_eq!(NodeClass::from_code(0), NodeClass::Object);
    }
}
