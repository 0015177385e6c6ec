#![allow(dead_code)]

use bytecode_flow::jvm::code::{
    BranchInstruction, CodeNode, CodeVisitor, ExceptionRange, Instruction, LabelGenerator,
    LocalVariable, MethodBody, SynLabel,
};
use bytecode_flow::jvm::verifier::StackMapFrame;
use bytecode_flow::jvm::BinaryName;
use std::collections::HashMap;

/// Capture logs when running with `RUST_LOG` set
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small helper for writing method bodies by hand
pub struct CodeBuilder {
    body: MethodBody,
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder {
            body: MethodBody::new(),
        }
    }

    pub fn label(&mut self) -> SynLabel {
        self.body.fresh_label()
    }

    pub fn place(&mut self, label: SynLabel) -> &mut Self {
        self.body.visit_label(label).unwrap();
        self
    }

    pub fn insn(&mut self, insn: Instruction) -> &mut Self {
        self.body.visit_instruction(&insn).unwrap();
        self
    }

    pub fn branch(&mut self, insn: BranchInstruction<SynLabel>) -> &mut Self {
        self.body.visit_branch(&insn).unwrap();
        self
    }

    pub fn line(&mut self, line: u16, start: SynLabel) -> &mut Self {
        self.body.visit_line_number(line, start).unwrap();
        self
    }

    pub fn variable(&mut self, variable: LocalVariable) -> &mut Self {
        self.body.visit_local_variable(&variable).unwrap();
        self
    }

    pub fn frame(&mut self, frame: StackMapFrame) -> &mut Self {
        self.body.visit_frame(&frame).unwrap();
        self
    }

    pub fn range(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch_type: Option<BinaryName>,
    ) -> &mut Self {
        let range = ExceptionRange {
            start,
            end,
            handler,
            catch_type,
        };
        self.body.visit_exception_range(&range).unwrap();
        self
    }

    pub fn finish(&mut self, max_stack: u16, max_locals: u16) -> MethodBody {
        self.body.visit_maxs(max_stack, max_locals).unwrap();
        self.body.visit_end().unwrap();
        std::mem::take(&mut self.body)
    }
}

/// Number of nodes equal to `node`
pub fn count(body: &MethodBody, node: &CodeNode) -> usize {
    body.nodes.iter().filter(|other| *other == node).count()
}

/// Index of the only node equal to `node`
pub fn position(body: &MethodBody, node: &CodeNode) -> usize {
    let found: Vec<usize> = body
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, other)| *other == node)
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(found.len(), 1, "expected exactly one {:?}", node);
    found[0]
}

/// Labels that directly follow each `aconst_null; goto` pair (where inlined subroutines return)
pub fn resumption_labels(body: &MethodBody) -> Vec<SynLabel> {
    body.nodes
        .windows(3)
        .filter_map(|window| match window {
            [CodeNode::Instruction(null), CodeNode::Branch(BranchInstruction::Goto(_)), CodeNode::Label(resume)]
                if *null == Instruction::AConstNull =>
            {
                Some(*resume)
            }
            _ => None,
        })
        .collect()
}

/// Check that there are no subroutines left and that every label referenced is placed
pub fn assert_fully_placed(body: &MethodBody) {
    let positions: HashMap<SynLabel, usize> = body.label_positions();
    assert!(!body.has_subroutines(), "subroutines left in {:?}", body.nodes);

    for node in &body.nodes {
        match node {
            CodeNode::Branch(branch) => {
                for target in branch.jump_targets().targets() {
                    assert!(positions.contains_key(target), "jump to unplaced {:?}", target);
                }
            }
            CodeNode::LineNumber(_, start) => assert!(positions.contains_key(start)),
            _ => (),
        }
    }
    for range in &body.exception_ranges {
        for label in [range.start, range.end, range.handler] {
            assert!(positions.contains_key(&label), "unplaced range {:?}", range);
        }
        assert!(positions[&range.start] < positions[&range.end]);
    }
    for variable in &body.local_variables {
        assert!(positions.contains_key(&variable.start));
        assert!(positions.contains_key(&variable.end));
    }
}
