//! Non-terminating instructions.
//!
//! Each instruction writes at most one result operand and reads any number of
//! source operands. The splitter never needs to understand what an
//! instruction computes; it relies on three questions every variant answers:
//!
//! - which operand does it write ([`Instruction::dest`]),
//! - which operands does it read ([`Instruction::uses`]),
//! - does it open a split candidate ([`Instruction::construction`]).

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::{ConstValue, IrType, VarId};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `==`
    Equal,
    /// `<`
    LessThan,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Negate,
}

/// How a list entry contributes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// The value becomes one element.
    Expression,
    /// The value is a list whose members are spliced in.
    Spread,
}

/// One initializer of a list construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListEntry {
    /// Expression or spread entry.
    pub kind: EntryKind,
    /// The operand holding the entry's value.
    pub value: VarId,
}

impl ListEntry {
    /// An expression entry.
    #[must_use]
    pub const fn expr(value: VarId) -> Self {
        Self {
            kind: EntryKind::Expression,
            value,
        }
    }

    /// A spread entry.
    #[must_use]
    pub const fn spread(value: VarId) -> Self {
        Self {
            kind: EntryKind::Spread,
            value,
        }
    }
}

/// One initializer of a record construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingEntry {
    /// `key: value`
    KeyValue {
        /// Field key.
        key: VarId,
        /// Field value.
        value: VarId,
    },
    /// `...expr`
    Spread {
        /// The mapping being spread.
        expr: VarId,
    },
}

/// Runtime entry points the bulk-literal splitter calls into.
///
/// The display form is the runtime symbol; these must resolve against the
/// runtime's list-initialisation support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum NativeHelper {
    /// `(size) -> handle`: allocates an entry array with `size` slots.
    #[strum(serialize = "getListInitialValueEntryArray")]
    AllocEntryArray,
    /// `(handle, value, index)`: stores an expression entry.
    #[strum(serialize = "setExpressionEntry")]
    SetExpressionEntry,
    /// `(handle, value, index)`: stores a spread entry.
    #[strum(serialize = "setSpreadEntry")]
    SetSpreadEntry,
}

impl NativeHelper {
    /// The setter matching an entry kind.
    #[must_use]
    pub const fn setter(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Expression => NativeHelper::SetExpressionEntry,
            EntryKind::Spread => NativeHelper::SetSpreadEntry,
        }
    }

    /// Number of arguments the runtime expects.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            NativeHelper::AllocEntryArray => 1,
            NativeHelper::SetExpressionEntry | NativeHelper::SetSpreadEntry => 3,
        }
    }
}

/// What a bulk construction builds. Decides whether the helper it ends up in
/// is eligible for periodic splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionKind {
    /// A list literal; the boundary operand is its size.
    List,
    /// A record literal; the boundary operand is its type descriptor.
    Record,
}

/// A non-terminating instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `dest = value`
    ConstantLoad {
        /// Result.
        dest: VarId,
        /// Literal.
        value: ConstValue,
    },
    /// `dest = src`
    Move {
        /// Result.
        dest: VarId,
        /// Source.
        src: VarId,
    },
    /// `dest = <ty> src`
    TypeCast {
        /// Result.
        dest: VarId,
        /// Source.
        src: VarId,
        /// Target type.
        ty: IrType,
        /// Whether the cast is checked at runtime.
        checked: bool,
    },
    /// `dest = src is ty`
    TypeTest {
        /// Boolean result.
        dest: VarId,
        /// Tested value.
        src: VarId,
        /// Tested type.
        ty: IrType,
    },
    /// `dest = lhs <op> rhs`
    Binary {
        /// Result.
        dest: VarId,
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: VarId,
        /// Right operand.
        rhs: VarId,
    },
    /// `dest = <op> operand`
    Unary {
        /// Result.
        dest: VarId,
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: VarId,
    },
    /// `dest = object[key]`
    FieldLoad {
        /// Result.
        dest: VarId,
        /// Container.
        object: VarId,
        /// Key or index.
        key: VarId,
    },
    /// `dest = typedesc<ty>`
    NewTypeDesc {
        /// Result.
        dest: VarId,
        /// Described type.
        ty: IrType,
    },
    /// `dest = new ty[size]{values}`
    NewArray {
        /// Result.
        dest: VarId,
        /// List type.
        ty: IrType,
        /// Element count, defined by an earlier instruction.
        size: VarId,
        /// Initializers.
        values: Vec<ListEntry>,
    },
    /// `dest = new ty[size]{handle}`: a list whose entries were stored into
    /// an entry array handle beforehand.
    NewLargeArray {
        /// Result.
        dest: VarId,
        /// List type.
        ty: IrType,
        /// Element count.
        size: VarId,
        /// Entry array handle.
        handle: VarId,
    },
    /// `dest = new typedesc{fields}`
    NewStructure {
        /// Result.
        dest: VarId,
        /// Type descriptor, defined by an earlier instruction.
        typedesc: VarId,
        /// Initializers.
        fields: Vec<MappingEntry>,
    },
    /// `dest = native helper(args)`
    NativeCall {
        /// Optional result.
        dest: Option<VarId>,
        /// Runtime entry point.
        helper: NativeHelper,
        /// Arguments.
        args: Vec<VarId>,
    },
}

impl Instruction {
    /// The operand this instruction writes.
    #[must_use]
    pub fn dest(&self) -> Option<VarId> {
        match self {
            Instruction::ConstantLoad { dest, .. }
            | Instruction::Move { dest, .. }
            | Instruction::TypeCast { dest, .. }
            | Instruction::TypeTest { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Unary { dest, .. }
            | Instruction::FieldLoad { dest, .. }
            | Instruction::NewTypeDesc { dest, .. }
            | Instruction::NewArray { dest, .. }
            | Instruction::NewLargeArray { dest, .. }
            | Instruction::NewStructure { dest, .. } => Some(*dest),
            Instruction::NativeCall { dest, .. } => *dest,
        }
    }

    /// Mutable access to the written operand.
    pub fn dest_mut(&mut self) -> Option<&mut VarId> {
        match self {
            Instruction::ConstantLoad { dest, .. }
            | Instruction::Move { dest, .. }
            | Instruction::TypeCast { dest, .. }
            | Instruction::TypeTest { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Unary { dest, .. }
            | Instruction::FieldLoad { dest, .. }
            | Instruction::NewTypeDesc { dest, .. }
            | Instruction::NewArray { dest, .. }
            | Instruction::NewLargeArray { dest, .. }
            | Instruction::NewStructure { dest, .. } => Some(dest),
            Instruction::NativeCall { dest, .. } => dest.as_mut(),
        }
    }

    /// The operands this instruction reads, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Instruction::ConstantLoad { .. } | Instruction::NewTypeDesc { .. } => Vec::new(),
            Instruction::Move { src, .. }
            | Instruction::TypeCast { src, .. }
            | Instruction::TypeTest { src, .. } => vec![*src],
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Unary { operand, .. } => vec![*operand],
            Instruction::FieldLoad { object, key, .. } => vec![*object, *key],
            Instruction::NewArray { size, values, .. } => std::iter::once(*size)
                .chain(values.iter().map(|entry| entry.value))
                .collect(),
            Instruction::NewLargeArray { size, handle, .. } => vec![*size, *handle],
            Instruction::NewStructure {
                typedesc, fields, ..
            } => {
                let mut uses = vec![*typedesc];
                for field in fields {
                    match field {
                        MappingEntry::KeyValue { key, value } => {
                            uses.push(*key);
                            uses.push(*value);
                        }
                        MappingEntry::Spread { expr } => uses.push(*expr),
                    }
                }
                uses
            }
            Instruction::NativeCall { args, .. } => args.clone(),
        }
    }

    /// Visits every operand, written and read, mutably.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut VarId)) {
        match self {
            Instruction::ConstantLoad { dest, .. } | Instruction::NewTypeDesc { dest, .. } => {
                f(dest);
            }
            Instruction::Move { dest, src }
            | Instruction::TypeCast { dest, src, .. }
            | Instruction::TypeTest { dest, src, .. } => {
                f(dest);
                f(src);
            }
            Instruction::Binary { dest, lhs, rhs, .. } => {
                f(dest);
                f(lhs);
                f(rhs);
            }
            Instruction::Unary { dest, operand, .. } => {
                f(dest);
                f(operand);
            }
            Instruction::FieldLoad { dest, object, key } => {
                f(dest);
                f(object);
                f(key);
            }
            Instruction::NewArray {
                dest, size, values, ..
            } => {
                f(dest);
                f(size);
                for entry in values {
                    f(&mut entry.value);
                }
            }
            Instruction::NewLargeArray {
                dest, size, handle, ..
            } => {
                f(dest);
                f(size);
                f(handle);
            }
            Instruction::NewStructure {
                dest,
                typedesc,
                fields,
            } => {
                f(dest);
                f(typedesc);
                for field in fields {
                    match field {
                        MappingEntry::KeyValue { key, value } => {
                            f(key);
                            f(value);
                        }
                        MappingEntry::Spread { expr } => f(expr),
                    }
                }
            }
            Instruction::NativeCall { dest, args, .. } => {
                if let Some(dest) = dest {
                    f(dest);
                }
                for arg in args {
                    f(arg);
                }
            }
        }
    }

    /// If this is a bulk construction, the operand whose definition bounds
    /// the construction's code and what is being constructed.
    #[must_use]
    pub fn construction(&self) -> Option<(VarId, ConstructionKind)> {
        match self {
            Instruction::NewArray { size, .. } => Some((*size, ConstructionKind::List)),
            Instruction::NewStructure { typedesc, .. } => {
                Some((*typedesc, ConstructionKind::Record))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::ConstantLoad { dest, value } => write!(f, "{dest} = const {value}"),
            Instruction::Move { dest, src } => write!(f, "{dest} = {src}"),
            Instruction::TypeCast {
                dest,
                src,
                ty,
                checked,
            } => {
                let marker = if *checked { "checked " } else { "" };
                write!(f, "{dest} = {marker}<{ty}> {src}")
            }
            Instruction::TypeTest { dest, src, ty } => write!(f, "{dest} = {src} is {ty}"),
            Instruction::Binary { dest, op, lhs, rhs } => write!(f, "{dest} = {op} {lhs}, {rhs}"),
            Instruction::Unary { dest, op, operand } => write!(f, "{dest} = {op} {operand}"),
            Instruction::FieldLoad { dest, object, key } => write!(f, "{dest} = {object}[{key}]"),
            Instruction::NewTypeDesc { dest, ty } => write!(f, "{dest} = typedesc<{ty}>"),
            Instruction::NewArray {
                dest,
                ty,
                size,
                values,
            } => {
                write!(f, "{dest} = new {ty}[{size}]{{")?;
                for (i, entry) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if entry.kind == EntryKind::Spread {
                        f.write_str("...")?;
                    }
                    write!(f, "{}", entry.value)?;
                }
                f.write_str("}")
            }
            Instruction::NewLargeArray {
                dest,
                ty,
                size,
                handle,
            } => write!(f, "{dest} = new {ty}[{size}]{{{handle}}}"),
            Instruction::NewStructure {
                dest,
                typedesc,
                fields,
            } => write!(f, "{dest} = new {typedesc}{{{} fields}}", fields.len()),
            Instruction::NativeCall { dest, helper, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "native {helper}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
