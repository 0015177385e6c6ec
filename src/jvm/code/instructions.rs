//! Symbolic JVM instructions. The representation is slightly different from the usual
//! presentation to make it more convenient to consume. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Operands are symbolic (names and descriptors), not constant pool indices
//!

use crate::jvm::{
    BaseType, BinaryName, Error, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName,
};
use std::fmt;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),        // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(InvokeDynamicRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    ArrayLength,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<BinaryName>, u8),
}

/// Instructions which (may) transfer control somewhere other than the next instruction
///
/// Unlike the other instructions, these all refer to labels. `Jsr` and `Ret` are included even
/// though most consumers can't handle them: removing them is the point of
/// [`crate::subroutines`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),                // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    Jsr(Lbl), // covers `jsr` and `jsr_w`
    Ret(u16), // covers `ret` and `wide ret`
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Can control continue to the next instruction in the method body?
    ///
    /// `jsr` counts as falling through, since that is where the subroutine returns to.
    pub fn falls_through(&self) -> bool {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Jsr(_) => true,

            BranchInstruction::Goto(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Ret(_) => false,
        }
    }

    /// If the instruction can jump to a label (non-fallthrough), get those labels
    pub fn jump_targets(&self) -> JumpTargets<Lbl> {
        match self {
            BranchInstruction::If(_, lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::IfICmp(_, lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::IfACmp(_, lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::IfNull(_, lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::Goto(lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::Jsr(lbl) => JumpTargets::Regular(*lbl),
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                JumpTargets::Many(ts)
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                JumpTargets::Many(ts)
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Ret(_) => JumpTargets::None,
        }
    }
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Is this `jsr` or `ret`?
    pub fn is_subroutine_instruction(&self) -> bool {
        matches!(self, BranchInstruction::Jsr(_) | BranchInstruction::Ret(_))
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&mut map_label).collect::<Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| map_label(lbl).map(|lbl| (*key, lbl)))
                    .collect::<Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            Jsr(lbl) => Jsr(map_label(lbl)?),
            Ret(local) => Ret(*local),
        })
    }
}

/// Non-fallthrough jump targets of a `BranchInstruction`
#[derive(Debug, PartialEq, Eq)]
pub enum JumpTargets<Lbl> {
    None,
    Regular(Lbl),
    Many(Vec<Lbl>),
}

impl<Lbl> JumpTargets<Lbl> {
    pub fn targets(&self) -> &[Lbl] {
        match self {
            JumpTargets::None => &[],
            JumpTargets::Regular(lbl) => std::slice::from_ref(lbl),
            JumpTargets::Many(lbls) => lbls,
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because its operand is not a method reference.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Kinds of method handles
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

/// Reference to a field, as used by `getfield`, `putstatic`, etc.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

impl FieldRef {
    pub fn parse(class: &str, name: &str, descriptor: &str) -> Result<FieldRef, Error> {
        Ok(FieldRef {
            class: BinaryName::from_str(class).map_err(Error::MalformedName)?,
            name: UnqualifiedName::from_str(name).map_err(Error::MalformedName)?,
            descriptor: FieldType::parse(descriptor)?,
        })
    }
}

/// Reference to a method, as used by the `invoke*` instructions
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub is_interface: bool,
}

impl MethodRef {
    pub fn parse(class: &str, name: &str, descriptor: &str) -> Result<MethodRef, Error> {
        Ok(MethodRef {
            class: BinaryName::from_str(class).map_err(Error::MalformedName)?,
            name: UnqualifiedName::from_str(name).map_err(Error::MalformedName)?,
            descriptor: MethodDescriptor::parse(descriptor)?,
            is_interface: false,
        })
    }
}

/// Bootstrap method and static arguments for `invokedynamic` and dynamic constants
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapMethod {
    pub kind: HandleKind,
    pub method: MethodRef,
    pub arguments: Vec<ConstantData>,
}

/// Operand of `invokedynamic`
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeDynamicRef {
    /// Name of the dynamically invoked method
    pub name: UnqualifiedName,

    /// Type of the dynamically invoked method
    pub descriptor: MethodDescriptor<BinaryName>,

    pub bootstrap: BootstrapMethod,
}

/// Dynamically computed constant
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicConstant {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub bootstrap: BootstrapMethod,
}

/// Operand of `ldc` and friends
#[derive(Clone, PartialEq)]
pub enum ConstantData {
    String(String),
    Class(RefType<BinaryName>),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(MethodDescriptor<BinaryName>),
    FieldHandle(HandleKind, FieldRef),
    MethodHandle(HandleKind, MethodRef),
    Dynamic(Box<DynamicConstant>),
}

impl fmt::Debug for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantData::String(string) => string.fmt(f),
            ConstantData::Class(ref_type) => ref_type.fmt(f),
            ConstantData::Integer(integer) => integer.fmt(f),
            ConstantData::Long(long) => write!(f, "{}L", long),
            ConstantData::Float(float) => write!(f, "{}F", float),
            ConstantData::Double(double) => write!(f, "{}D", double),
            ConstantData::MethodType(descriptor) => descriptor.fmt(f),
            ConstantData::FieldHandle(kind, field) => write!(f, "{:?} {:?}", kind, field),
            ConstantData::MethodHandle(kind, method) => write!(f, "{:?} {:?}", kind, method),
            ConstantData::Dynamic(dynamic) => dynamic.fmt(f),
        }
    }
}
