//! Value types and constants carried by IR variables and instructions.
//!
//! The splitter only needs a small slice of a type system: enough to give a
//! helper function a return type, to build the `T|error` union used when an
//! extracted region can propagate an error, and to type the scratch
//! temporaries introduced by the bulk-literal splitter.

use std::fmt;

/// Type of an IR variable or the declared return type of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// The unit type `()`.
    Nil,
    /// Boolean.
    Boolean,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// String.
    String,
    /// The top type.
    Any,
    /// The error type.
    Error,
    /// A list with the given element type.
    List(Box<IrType>),
    /// A named record type.
    Record(String),
    /// A runtime type descriptor.
    TypeDesc,
    /// An opaque native handle.
    Handle,
    /// A union of two or more members. Use [`IrType::union`] to build one.
    Union(Vec<IrType>),
}

impl IrType {
    /// Builds the union of `self` and `other`, flattening nested unions and
    /// dropping duplicate members.
    ///
    /// A union of a single distinct member collapses to that member.
    #[must_use]
    pub fn union(self, other: IrType) -> IrType {
        let mut members = Vec::new();
        for ty in [self, other] {
            match ty {
                IrType::Union(inner) => members.extend(inner),
                ty => members.push(ty),
            }
        }

        let mut unique: Vec<IrType> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }

        if unique.len() == 1 {
            unique.remove(0)
        } else {
            IrType::Union(unique)
        }
    }

    /// Returns `self|error`, the return type of a helper whose body may
    /// propagate an error.
    #[must_use]
    pub fn or_error(self) -> IrType {
        self.union(IrType::Error)
    }

    /// Returns `any|error`, the element type of an entry array slot.
    #[must_use]
    pub fn any_or_error() -> IrType {
        IrType::Any.union(IrType::Error)
    }

    /// Returns `error|()`.
    #[must_use]
    pub fn error_or_nil() -> IrType {
        IrType::Error.union(IrType::Nil)
    }

    /// Returns true if this is exactly the error type.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, IrType::Error)
    }

    /// Returns true if a value of this type may be an error.
    #[must_use]
    pub fn may_be_error(&self) -> bool {
        match self {
            IrType::Error | IrType::Any => true,
            IrType::Union(members) => members.iter().any(IrType::may_be_error),
            _ => false,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Nil => f.write_str("()"),
            IrType::Boolean => f.write_str("boolean"),
            IrType::Int => f.write_str("int"),
            IrType::Float => f.write_str("float"),
            IrType::String => f.write_str("string"),
            IrType::Any => f.write_str("any"),
            IrType::Error => f.write_str("error"),
            IrType::List(element) => write!(f, "{element}[]"),
            IrType::Record(name) => f.write_str(name),
            IrType::TypeDesc => f.write_str("typedesc"),
            IrType::Handle => f.write_str("handle"),
            IrType::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

/// A literal loaded by [`crate::ir::Instruction::ConstantLoad`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// `()`
    Nil,
    /// Boolean literal.
    Boolean(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
}

impl ConstValue {
    /// The type of this literal.
    #[must_use]
    pub fn ty(&self) -> IrType {
        match self {
            ConstValue::Nil => IrType::Nil,
            ConstValue::Boolean(_) => IrType::Boolean,
            ConstValue::Int(_) => IrType::Int,
            ConstValue::Float(_) => IrType::Float,
            ConstValue::String(_) => IrType::String,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Nil => f.write_str("()"),
            ConstValue::Boolean(value) => write!(f, "{value}"),
            ConstValue::Int(value) => write!(f, "{value}"),
            ConstValue::Float(value) => write!(f, "{value}"),
            ConstValue::String(value) => write!(f, "{value:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_flattens_and_dedupes() {
        let ty = IrType::Int.union(IrType::Error).union(IrType::Error.union(IrType::Nil));
        assert_eq!(
            ty,
            IrType::Union(vec![IrType::Int, IrType::Error, IrType::Nil])
        );
    }

    #[test]
    fn test_union_of_same_type_collapses() {
        assert_eq!(IrType::Error.union(IrType::Error), IrType::Error);
    }

    #[test]
    fn test_may_be_error() {
        assert!(IrType::Int.or_error().may_be_error());
        assert!(IrType::any_or_error().may_be_error());
        assert!(!IrType::List(Box::new(IrType::Int)).may_be_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(IrType::error_or_nil().to_string(), "error|()");
        assert_eq!(IrType::List(Box::new(IrType::Int)).to_string(), "int[]");
        assert_eq!(ConstValue::String("a".into()).to_string(), "\"a\"");
    }
}
