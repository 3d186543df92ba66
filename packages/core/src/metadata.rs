//! Read-only metadata derived from a service description.
//!
//! [`Method`] and [`Type`] are what a caller sees when asking a client which
//! operations and types a service offers. Both collections preserve
//! declaration order from the (flattened) document.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One input parameter of a [`Method`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Local name of the declared type or element, e.g. `"int"` or `"Add"`.
    pub type_name: String,
}

/// A callable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Local name of the return type, or `"void"` for one-way operations.
    pub return_type: String,
}

/// Formats as a signature, e.g. `AddResponse Add(Add parameters)`.
impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.type_name, p.name)?;
        }
        write!(f, ")")
    }
}

/// What kind of schema declaration a [`Type`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// A named `complexType`.
    Complex,
    /// A named `simpleType`.
    Simple,
    /// A top-level `element` declaration.
    Element,
}

/// One member of a complex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    /// `maxOccurs` allows more than one occurrence.
    pub repeated: bool,
}

/// A schema type declared by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub name: String,
    pub kind: TypeKind,
    /// Restriction base of a simple type, or the `type` of an element
    /// declared by reference to a named type.
    pub base: Option<String>,
    pub fields: Vec<Field>,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return match &self.base {
                Some(base) => write!(f, "{} {}", base, self.name),
                None => write!(f, "anyType {}", self.name),
            };
        }
        writeln!(f, "struct {} {{", self.name)?;
        for field in &self.fields {
            let suffix = if field.repeated { "[]" } else { "" };
            writeln!(f, " {}{} {};", field.type_name, suffix, field.name)?;
        }
        write!(f, "}}")
    }
}

/// Everything a client can report about a service without calling it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub methods: Vec<Method>,
    pub types: Vec<Type>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_signature() {
        let m = Method {
            name: "Add".into(),
            parameters: vec![
                Parameter { name: "a".into(), type_name: "int".into() },
                Parameter { name: "b".into(), type_name: "int".into() },
            ],
            return_type: "int".into(),
        };
        assert_eq!(m.to_string(), "int Add(int a, int b)");
    }

    #[test]
    fn struct_rendering() {
        let t = Type {
            name: "Bank".into(),
            kind: TypeKind::Complex,
            base: None,
            fields: vec![
                Field { name: "bic".into(), type_name: "string".into(), repeated: false },
                Field { name: "branches".into(), type_name: "string".into(), repeated: true },
            ],
        };
        assert_eq!(t.to_string(), "struct Bank {\n string bic;\n string[] branches;\n}");
    }

    #[test]
    fn simple_type_rendering() {
        let t = Type {
            name: "Code".into(),
            kind: TypeKind::Simple,
            base: Some("string".into()),
            fields: vec![],
        };
        assert_eq!(t.to_string(), "string Code");
    }
}
