use super::*;
use crate::jvm::verifier::StackMapFrame;
use crate::jvm::Error;
use std::collections::HashMap;

/// Element of a method body's code, in order
#[derive(Clone, Debug, PartialEq)]
pub enum CodeNode {
    Label(SynLabel),
    Instruction(Instruction),
    Branch(BranchInstruction<SynLabel>),
    Frame(StackMapFrame),
    LineNumber(u16, SynLabel),
}

/// Method body held in memory
///
/// This is both the end of a chain of [`CodeVisitor`]s (it records everything it is given) and a
/// source of them (see [`MethodBody::accept`]). As the end of a chain, it also hands out fresh
/// labels.
#[derive(Clone, Debug)]
pub struct MethodBody {
    pub nodes: Vec<CodeNode>,
    pub exception_ranges: Vec<ExceptionRange>,
    pub local_variables: Vec<LocalVariable>,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Source of fresh labels
    labels: SynLabelGenerator,

    /// Has `visit_end` been called?
    ended: bool,
}

impl MethodBody {
    pub fn new() -> MethodBody {
        MethodBody::with_labels(SynLabelGenerator::default())
    }

    pub fn with_labels(labels: SynLabelGenerator) -> MethodBody {
        MethodBody {
            nodes: vec![],
            exception_ranges: vec![],
            local_variables: vec![],
            max_stack: 0,
            max_locals: 0,
            labels,
            ended: false,
        }
    }

    /// Empty method body whose fresh labels won't clash with any label in `other`
    ///
    /// Use this to build the end of a chain of visitors fed from `other`.
    pub fn continuing(other: &MethodBody) -> MethodBody {
        MethodBody::with_labels(other.labels.clone())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Does the code contain any `jsr` or `ret`?
    pub fn has_subroutines(&self) -> bool {
        self.nodes.iter().any(|node| match node {
            CodeNode::Branch(branch) => branch.is_subroutine_instruction(),
            _ => false,
        })
    }

    /// Index in `nodes` of every label
    pub fn label_positions(&self) -> HashMap<SynLabel, usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                CodeNode::Label(label) => Some((*label, index)),
                _ => None,
            })
            .collect()
    }

    /// Replay the whole method body into a visitor (including `visit_end`)
    pub fn accept<V: CodeVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), Error> {
        for range in &self.exception_ranges {
            visitor.visit_exception_range(range)?;
        }
        for node in &self.nodes {
            match node {
                CodeNode::Label(label) => visitor.visit_label(*label)?,
                CodeNode::Instruction(insn) => visitor.visit_instruction(insn)?,
                CodeNode::Branch(insn) => visitor.visit_branch(insn)?,
                CodeNode::Frame(frame) => visitor.visit_frame(frame)?,
                CodeNode::LineNumber(line, start) => visitor.visit_line_number(*line, *start)?,
            }
        }
        for variable in &self.local_variables {
            visitor.visit_local_variable(variable)?;
        }
        visitor.visit_maxs(self.max_stack, self.max_locals)?;
        visitor.visit_end()
    }

    fn check_not_ended(&self) -> Result<(), Error> {
        if self.ended {
            Err(Error::VisitAfterEnd)
        } else {
            Ok(())
        }
    }
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody::new()
    }
}

impl LabelGenerator<SynLabel> for MethodBody {
    fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh_label()
    }
}

impl CodeVisitor for MethodBody {
    fn visit_label(&mut self, label: SynLabel) -> Result<(), Error> {
        self.check_not_ended()?;
        self.labels.reserve(label);
        self.nodes.push(CodeNode::Label(label));
        Ok(())
    }

    fn visit_instruction(&mut self, insn: &Instruction) -> Result<(), Error> {
        self.check_not_ended()?;
        self.nodes.push(CodeNode::Instruction(insn.clone()));
        Ok(())
    }

    fn visit_branch(&mut self, insn: &BranchInstruction<SynLabel>) -> Result<(), Error> {
        self.check_not_ended()?;
        for target in insn.jump_targets().targets() {
            self.labels.reserve(*target);
        }
        self.nodes.push(CodeNode::Branch(insn.clone()));
        Ok(())
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        self.check_not_ended()?;
        self.nodes.push(CodeNode::Frame(frame.clone()));
        Ok(())
    }

    fn visit_exception_range(&mut self, range: &ExceptionRange) -> Result<(), Error> {
        self.check_not_ended()?;
        for label in [range.start, range.end, range.handler] {
            self.labels.reserve(label);
        }
        self.exception_ranges.push(range.clone());
        Ok(())
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<(), Error> {
        self.check_not_ended()?;
        self.labels.reserve(variable.start);
        self.labels.reserve(variable.end);
        self.local_variables.push(variable.clone());
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: SynLabel) -> Result<(), Error> {
        self.check_not_ended()?;
        self.labels.reserve(start);
        self.nodes.push(CodeNode::LineNumber(line, start));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.check_not_ended()?;
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.check_not_ended()?;
        self.ended = true;
        Ok(())
    }
}
