use super::*;
use crate::jvm::code::{BranchInstruction, ConstantData, Instruction, InvokeType, SynLabel};
use crate::jvm::{
    BinaryName, FieldType, MethodHeader, RefType, UnqualifiedName, VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};
use std::collections::HashMap;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// This is the compact form, where `long` and `double` appear only once (and take up two
/// offsets). See [`SlotFrame`] for the expanded form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: OffsetVec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Compact frame, as tracked when simulating a method body
pub type VerifierFrame = Frame<RefType<BinaryName>, SynLabel>;

impl<Cls, U> Frame<Cls, U> {
    pub fn new(
        locals: impl IntoIterator<Item = VerificationType<Cls, U>>,
        stack: impl IntoIterator<Item = VerificationType<Cls, U>>,
    ) -> Frame<Cls, U> {
        Frame {
            locals: locals.into_iter().collect(),
            stack: stack.into_iter().collect(),
        }
    }
}

impl VerifierFrame {
    pub fn map_uninitialized<E>(
        &self,
        mut map_label: impl FnMut(&SynLabel) -> Result<SynLabel, E>,
    ) -> Result<VerifierFrame, E> {
        let mut map_types = |types: &OffsetVec<VType>| {
            types
                .iter()
                .map(|(_, t)| t.map_uninitialized(&mut map_label))
                .collect::<Result<OffsetVec<VType>, E>>()
        };
        Ok(Frame {
            locals: map_types(&self.locals)?,
            stack: map_types(&self.stack)?,
        })
    }
}

/// Stack map frame, as it shows up in a stream of code
///
/// Only the `Expanded` variant can be simulated: every other variant is relative to a previous
/// frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Complete frame, produced by a reader which expands frames
    Expanded(VerifierFrame),

    /// Complete frame, as stored in the class file
    Full(VerifierFrame),

    SameLocalsNoStack,
    SameLocalsOneStack(VType),
    ChopLocalsNoStack(u8),
    AppendLocalsNoStack(Vec<VType>),
}

impl StackMapFrame {
    /// Name of the kind of frame (for error messages)
    pub fn kind(&self) -> &'static str {
        match self {
            StackMapFrame::Expanded(_) => "expanded",
            StackMapFrame::Full(_) => "full_frame",
            StackMapFrame::SameLocalsNoStack => "same_frame",
            StackMapFrame::SameLocalsOneStack(_) => "same_locals_1_stack_item_frame",
            StackMapFrame::ChopLocalsNoStack(_) => "chop_frame",
            StackMapFrame::AppendLocalsNoStack(_) => "append_frame",
        }
    }

    /// Rewrite the labels of `new` instructions referenced by uninitialized types
    pub fn map_uninitialized<E>(
        &self,
        mut map_label: impl FnMut(&SynLabel) -> Result<SynLabel, E>,
    ) -> Result<StackMapFrame, E> {
        Ok(match self {
            StackMapFrame::Expanded(frame) => {
                StackMapFrame::Expanded(frame.map_uninitialized(map_label)?)
            }
            StackMapFrame::Full(frame) => StackMapFrame::Full(frame.map_uninitialized(map_label)?),
            StackMapFrame::SameLocalsNoStack => StackMapFrame::SameLocalsNoStack,
            StackMapFrame::SameLocalsOneStack(typ) => {
                StackMapFrame::SameLocalsOneStack(typ.map_uninitialized(map_label)?)
            }
            StackMapFrame::ChopLocalsNoStack(chopped) => StackMapFrame::ChopLocalsNoStack(*chopped),
            StackMapFrame::AppendLocalsNoStack(locals) => StackMapFrame::AppendLocalsNoStack(
                locals
                    .iter()
                    .map(|t| t.map_uninitialized(&mut map_label))
                    .collect::<Result<_, E>>()?,
            ),
        })
    }
}

/// Expanded snapshot of the stack and local variables
///
/// Every slot has its own entry: `long` and `double` are followed by a `Top` entry. This is the
/// form in which instruction effects are simulated, since instructions like `pop2` or `dup2`
/// operate on slots without regard for what is in them.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SlotFrame {
    pub locals: Vec<VType>,
    pub stack: Vec<VType>,
}

impl SlotFrame {
    /// Frame on entry to a method: receiver (if any) and parameters in the locals, empty stack
    pub fn method_entry(header: &MethodHeader) -> SlotFrame {
        let mut locals = vec![];
        if !header.is_static() {
            if header.is_constructor() {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::Object(RefType::Object(header.class.clone())));
            }
        }
        for parameter in &header.descriptor.parameters {
            push(&mut locals, VType::from(parameter.clone()));
        }
        SlotFrame {
            locals,
            stack: vec![],
        }
    }

    pub fn from_frame(frame: &VerifierFrame) -> SlotFrame {
        let mut slot_frame = SlotFrame::default();
        for (_, typ) in &frame.locals {
            push(&mut slot_frame.locals, typ.clone());
        }
        for (_, typ) in &frame.stack {
            push(&mut slot_frame.stack, typ.clone());
        }
        slot_frame
    }

    pub fn to_frame(&self) -> VerifierFrame {
        Frame {
            locals: compact(&self.locals).collect(),
            stack: compact(&self.stack).collect(),
        }
    }

    /// Type in a local variable slot (`Top` if the slot was never written)
    pub fn local(&self, index: usize) -> VType {
        get_local(&self.locals, index)
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `new_label` is the label identifying the instruction if it is a `new`, and `uninitialized`
    /// maps those labels to the class being constructed.
    pub fn simulate_instruction(
        &mut self,
        insn: &Instruction,
        this_class: &BinaryName,
        uninitialized: &HashMap<SynLabel, BinaryName>,
        new_label: Option<SynLabel>,
    ) -> Result<(), VerifierErrorKind> {
        simulate_instruction(self, this_class, uninitialized, insn, new_label)
    }

    /// Update the frame to reflect the effects of the given branching instruction
    ///
    /// This only accounts for the operands consumed. Whether the frame is meaningful afterwards
    /// (ie. whether the instruction falls through) is up to the caller.
    pub fn simulate_branch(
        &mut self,
        insn: &BranchInstruction<SynLabel>,
    ) -> Result<(), VerifierErrorKind> {
        simulate_branch(self, insn)
    }
}

fn simulate_instruction(
    frame: &mut SlotFrame,
    this_class: &BinaryName,
    uninitialized: &HashMap<SynLabel, BinaryName>,
    insn: &Instruction,
    new_label: Option<SynLabel>,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let SlotFrame {
        ref mut stack,
        ref mut locals,
    } = frame;

    match insn {
        Nop => (),
        AConstNull => push(stack, Null),
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | BiPush(_)
        | SiPush(_) => push(stack, Integer),
        LConst0 | LConst1 => push(stack, Long),
        FConst0 | FConst1 | FConst2 => push(stack, Float),
        DConst0 | DConst1 => push(stack, Double),
        Ldc(constant) => push(stack, constant_type(constant)),

        ILoad(index) | FLoad(index) | ALoad(index) => {
            stack.push(get_local(locals, *index as usize));
        }
        LLoad(index) | DLoad(index) => {
            stack.push(get_local(locals, *index as usize));
            stack.push(Top);
        }

        IALoad | BALoad | CALoad | SALoad => {
            pop_slots(stack, 2)?;
            push(stack, Integer);
        }
        LALoad => {
            pop_slots(stack, 2)?;
            push(stack, Long);
        }
        FALoad => {
            pop_slots(stack, 2)?;
            push(stack, Float);
        }
        DALoad => {
            pop_slots(stack, 2)?;
            push(stack, Double);
        }
        AALoad => {
            pop_slots(stack, 1)?;
            match pop(stack)? {
                Null => push(stack, Null),
                Object(ref_type) => match ref_type.element_type() {
                    Some(element_type) => push(stack, VType::from(element_type)),
                    None => push(stack, Object(RefType::Object(BinaryName::OBJECT))),
                },
                other => return Err(VerifierErrorKind::NotArrayType(other)),
            }
        }

        IStore(index) | FStore(index) | AStore(index) => {
            let value = pop(stack)?;
            store_local(locals, *index as usize, value, false);
        }
        LStore(index) | DStore(index) => {
            pop_slots(stack, 1)?;
            let value = pop(stack)?;
            store_local(locals, *index as usize, value, true);
        }

        IAStore | BAStore | CAStore | SAStore | FAStore | AAStore => pop_slots(stack, 3)?,
        LAStore | DAStore => pop_slots(stack, 4)?,

        Pop => pop_slots(stack, 1)?,
        Pop2 => pop_slots(stack, 2)?,
        Dup => {
            let arg1 = pop(stack)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }
        DupX1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }
        DupX2 => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            let arg3 = pop(stack)?;
            stack.push(arg1.clone());
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2 => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2X1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            let arg3 = pop(stack)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2X2 => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            let arg3 = pop(stack)?;
            let arg4 = pop(stack)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg4);
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Swap => {
            let arg1 = pop(stack)?;
            let arg2 = pop(stack)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
            pop_slots(stack, 2)?;
            push(stack, Integer);
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
            pop_slots(stack, 4)?;
            push(stack, Long);
        }
        FAdd | FSub | FMul | FDiv | FRem => {
            pop_slots(stack, 2)?;
            push(stack, Float);
        }
        DAdd | DSub | DMul | DDiv | DRem => {
            pop_slots(stack, 4)?;
            push(stack, Double);
        }
        LSh(_) => {
            pop_slots(stack, 3)?;
            push(stack, Long);
        }

        INeg | I2B | I2C | I2S => {
            pop_slots(stack, 1)?;
            push(stack, Integer);
        }
        LNeg => {
            pop_slots(stack, 2)?;
            push(stack, Long);
        }
        FNeg => {
            pop_slots(stack, 1)?;
            push(stack, Float);
        }
        DNeg => {
            pop_slots(stack, 2)?;
            push(stack, Double);
        }

        IInc(index, _) => set_local(locals, *index as usize, Integer),

        I2L | F2L => {
            pop_slots(stack, 1)?;
            push(stack, Long);
        }
        I2F => {
            pop_slots(stack, 1)?;
            push(stack, Float);
        }
        I2D | F2D => {
            pop_slots(stack, 1)?;
            push(stack, Double);
        }
        L2I | D2I => {
            pop_slots(stack, 2)?;
            push(stack, Integer);
        }
        L2F | D2F => {
            pop_slots(stack, 2)?;
            push(stack, Float);
        }
        L2D => {
            pop_slots(stack, 2)?;
            push(stack, Double);
        }
        D2L => {
            pop_slots(stack, 2)?;
            push(stack, Long);
        }
        F2I => {
            pop_slots(stack, 1)?;
            push(stack, Integer);
        }

        LCmp | DCmp(_) => {
            pop_slots(stack, 4)?;
            push(stack, Integer);
        }
        FCmp(_) => {
            pop_slots(stack, 2)?;
            push(stack, Integer);
        }

        GetStatic(field) => push(stack, VType::from(field.descriptor.clone())),
        PutStatic(field) => pop_slots(stack, field.descriptor.width())?,
        GetField(field) => {
            pop_slots(stack, 1)?;
            push(stack, VType::from(field.descriptor.clone()));
        }
        PutField(field) => pop_slots(stack, field.descriptor.width() + 1)?,

        Invoke(invoke_type, method) => {
            pop_slots(stack, method.descriptor.parameter_length(false))?;

            if *invoke_type != InvokeType::Static {
                let receiver = pop(stack)?;

                if *invoke_type == InvokeType::Special && method.name == UnqualifiedName::INIT {
                    let initialized = match receiver {
                        UninitializedThis => Object(RefType::Object(this_class.clone())),
                        Uninitialized(label) => match uninitialized.get(&label) {
                            Some(class) => Object(RefType::Object(class.clone())),
                            None => return Err(VerifierErrorKind::UnknownUninitialized(label)),
                        },
                        _ => receiver.clone(),
                    };
                    replace_all(stack, &receiver, &initialized);
                    replace_all(locals, &receiver, &initialized);
                }
            }

            if let Some(return_type) = &method.descriptor.return_type {
                push(stack, VType::from(return_type.clone()));
            }
        }
        InvokeDynamic(invoke_dynamic) => {
            pop_slots(stack, invoke_dynamic.descriptor.parameter_length(false))?;
            if let Some(return_type) = &invoke_dynamic.descriptor.return_type {
                push(stack, VType::from(return_type.clone()));
            }
        }

        New(_) => {
            let label = new_label.ok_or(VerifierErrorKind::UnlabelledNew)?;
            push(stack, Uninitialized(label));
        }
        NewArray(base_type) => {
            pop_slots(stack, 1)?;
            push(stack, Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_slots(stack, 1)?;
            push(stack, Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        MultiANewArray(ref_type, dimensions) => {
            pop_slots(stack, *dimensions as usize)?;
            push(stack, Object(ref_type.clone()));
        }
        ArrayLength | InstanceOf(_) => {
            pop_slots(stack, 1)?;
            push(stack, Integer);
        }
        CheckCast(ref_type) => {
            pop_slots(stack, 1)?;
            push(stack, Object(ref_type.clone()));
        }
        MonitorEnter | MonitorExit => pop_slots(stack, 1)?,
    }

    Ok(())
}

fn simulate_branch(
    frame: &mut SlotFrame,
    insn: &BranchInstruction<SynLabel>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;

    let stack = &mut frame.stack;
    match insn {
        If(_, _) | IfNull(_, _) => pop_slots(stack, 1),
        IfICmp(_, _) | IfACmp(_, _) => pop_slots(stack, 2),
        TableSwitch { .. } | LookupSwitch { .. } => pop_slots(stack, 1),
        IReturn | FReturn | AReturn | AThrow => pop_slots(stack, 1),
        LReturn | DReturn => pop_slots(stack, 2),
        Goto(_) | Return => Ok(()),

        // Return addresses have no verification type, see `Simulator`
        Jsr(_) | Ret(_) => Ok(()),
    }
}

/// Type pushed by `ldc` and friends
fn constant_type(constant: &ConstantData) -> VType {
    let object = |name: BinaryName| VType::Object(RefType::Object(name));
    match constant {
        ConstantData::Integer(_) => VType::Integer,
        ConstantData::Float(_) => VType::Float,
        ConstantData::Long(_) => VType::Long,
        ConstantData::Double(_) => VType::Double,
        ConstantData::String(_) => object(BinaryName::STRING),
        ConstantData::Class(_) => object(BinaryName::CLASS),
        ConstantData::MethodType(_) => object(BinaryName::METHODTYPE),
        ConstantData::FieldHandle(_, _) | ConstantData::MethodHandle(_, _) => {
            object(BinaryName::METHODHANDLE)
        }
        ConstantData::Dynamic(dynamic) => VType::from(dynamic.descriptor.clone()),
    }
}

/// Push a value, along with a `Top` if it is wide
fn push(slots: &mut Vec<VType>, typ: VType) {
    let is_wide = typ.is_wide();
    slots.push(typ);
    if is_wide {
        slots.push(VType::Top);
    }
}

fn pop(stack: &mut Vec<VType>) -> Result<VType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_slots(stack: &mut Vec<VType>, count: usize) -> Result<(), VerifierErrorKind> {
    if stack.len() < count {
        return Err(VerifierErrorKind::EmptyStack);
    }
    stack.truncate(stack.len() - count);
    Ok(())
}

fn get_local(locals: &[VType], index: usize) -> VType {
    locals.get(index).cloned().unwrap_or(VType::Top)
}

fn set_local(locals: &mut Vec<VType>, index: usize, typ: VType) {
    if index >= locals.len() {
        locals.resize(index + 1, VType::Top);
    }
    locals[index] = typ;
}

/// Store into a local, invalidating any wide value whose second half gets overwritten
fn store_local(locals: &mut Vec<VType>, index: usize, typ: VType, is_wide: bool) {
    set_local(locals, index, typ);
    if is_wide {
        set_local(locals, index + 1, VType::Top);
    }
    if index > 0 && get_local(locals, index - 1).is_wide() {
        set_local(locals, index - 1, VType::Top);
    }
}

fn replace_all(slots: &mut [VType], original: &VType, updated: &VType) {
    for slot in slots.iter_mut() {
        if slot == original {
            *slot = updated.clone();
        }
    }
}

/// Drop the `Top` entries following wide values
fn compact(slots: &[VType]) -> impl Iterator<Item = VType> + '_ {
    let mut skip_next = false;
    slots.iter().filter_map(move |typ| {
        if skip_next && *typ == VType::Top {
            skip_next = false;
            return None;
        }
        skip_next = typ.is_wide();
        Some(typ.clone())
    })
}
