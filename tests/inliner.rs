mod common;

use bytecode_flow::jvm::code::{
    BranchInstruction::*, CodeNode, EqComparison, Instruction::*, InvokeType, MethodBody,
    MethodRef, OrdComparison,
};
use bytecode_flow::jvm::verifier::Simulator;
use bytecode_flow::jvm::{BinaryName, Error, MethodAccessFlags, MethodHeader, Name};
use bytecode_flow::subroutines::{
    inline_subroutines, InlinerSettings, SubroutineInliner, SubroutineMap,
};
use common::*;
use pretty_assertions::assert_eq;

/// ```java,ignore,no_run
/// static void run(Object lock) {
///     try {
///         if (lock == null) return;
///         lock.notify();
///     } finally {
///         System.gc();
///     }
/// }
/// ```
///
/// As compiled by an old `javac`: the `finally` is called from the early return, from the end
/// of the `try`, and from the catch-all handler.
fn finally_from_three_sites() -> MethodBody {
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    let fin = code.label();
    let not_null = code.label();
    let gc = MethodRef::parse("java/lang/System", "gc", "()V").unwrap();
    let notify = MethodRef::parse("java/lang/Object", "notify", "()V").unwrap();

    code.range(start, end, handler, None)
        .place(start)
        .insn(ALoad(0))
        .branch(IfNull(EqComparison::NE, not_null))
        .branch(Jsr(fin))
        .branch(Return)
        .place(not_null)
        .insn(ALoad(0))
        .insn(Invoke(InvokeType::Virtual, notify))
        .place(end)
        .branch(Jsr(fin))
        .branch(Return)
        .place(handler)
        .insn(AStore(1))
        .branch(Jsr(fin))
        .insn(ALoad(1))
        .branch(AThrow)
        .place(fin)
        .insn(AStore(2))
        .insn(Invoke(InvokeType::Static, gc))
        .branch(Ret(2));
    code.finish(1, 3)
}

/// Nested `try`/`finally`, where each `finally` is called from two sites
///
/// ```java,ignore,no_run
/// static void run(int x) {
///     try {
///         x = 0;
///     } finally {
///         try {
///             x = 1;
///         } finally {
///             x++;
///         }
///     }
/// }
/// ```
fn nested_finally() -> MethodBody {
    let mut code = CodeBuilder::new();
    let outer_start = code.label();
    let outer_end = code.label();
    let outer_handler = code.label();
    let outer = code.label();
    let inner_start = code.label();
    let inner_end = code.label();
    let inner_handler = code.label();
    let outer_done = code.label();
    let inner = code.label();

    code.range(outer_start, outer_end, outer_handler, None)
        .range(inner_start, inner_end, inner_handler, None)
        // try { x = 0; }
        .place(outer_start)
        .insn(IConst0)
        .insn(IStore(0))
        .place(outer_end)
        .branch(Jsr(outer))
        .branch(Return)
        .place(outer_handler)
        .insn(AStore(1))
        .branch(Jsr(outer))
        .insn(ALoad(1))
        .branch(AThrow)
        // outer finally
        .place(outer)
        .insn(AStore(2))
        .place(inner_start)
        .insn(IConst1)
        .insn(IStore(0))
        .place(inner_end)
        .branch(Jsr(inner))
        .branch(Goto(outer_done))
        .place(inner_handler)
        .insn(AStore(3))
        .branch(Jsr(inner))
        .insn(ALoad(3))
        .branch(AThrow)
        .place(outer_done)
        .branch(Ret(2))
        // inner finally
        .place(inner)
        .insn(AStore(4))
        .insn(IInc(0, 1))
        .branch(Ret(4));
    code.finish(1, 5)
}

#[test]
fn no_subroutines_is_a_no_op() {
    init_logger();

    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.range(start, end, handler, Some(BinaryName::THROWABLE))
        .place(start)
        .insn(ALoad(0))
        .insn(MonitorEnter)
        .place(end)
        .branch(Return)
        .place(handler)
        .branch(AThrow);
    let body = code.finish(1, 1);

    let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
    assert_eq!(inlined.nodes, body.nodes);
    assert_eq!(inlined.exception_ranges, body.exception_ranges);
    assert_eq!((inlined.max_stack, inlined.max_locals), (1, 1));
}

#[test]
fn one_copy_per_call_site() {
    init_logger();
    let body = finally_from_three_sites();

    let map = SubroutineMap::compute(&body).unwrap();
    assert_eq!(map.count(), 2);

    let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
    assert_fully_placed(&inlined);
    assert_eq!(count(&inlined, &CodeNode::Instruction(AStore(2))), 3);

    // Each copy returns to right after the `jsr` that called it
    let resumptions = resumption_labels(&inlined);
    assert_eq!(resumptions.len(), 3);
    let returns: Vec<_> = inlined
        .nodes
        .windows(2)
        .filter_map(|window| match window {
            [CodeNode::Instruction(Invoke(_, method)), CodeNode::Branch(Goto(target))]
                if method.name.as_str() == "gc" =>
            {
                Some(*target)
            }
            _ => None,
        })
        .collect();
    assert_eq!(returns, resumptions);
}

#[test]
fn scenario_two_sites() {
    init_logger();

    // `finally` reached from the end of the `try` and from the handler
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    let fin = code.label();
    code.range(start, end, handler, None)
        .place(start)
        .insn(Nop)
        .place(end)
        .branch(Jsr(fin))
        .branch(Return)
        .place(handler)
        .insn(AStore(1))
        .branch(Jsr(fin))
        .insn(ALoad(1))
        .branch(AThrow)
        .place(fin)
        .insn(AStore(2))
        .insn(IConst5)
        .insn(IStore(0))
        .branch(Ret(2));
    let body = code.finish(1, 3);

    let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
    assert_fully_placed(&inlined);
    assert_eq!(count(&inlined, &CodeNode::Instruction(IConst5)), 2);

    let resumptions = resumption_labels(&inlined);
    assert_eq!(resumptions.len(), 2);
    assert_ne!(resumptions[0], resumptions[1]);
    for resume in &resumptions {
        let gotos = inlined
            .nodes
            .iter()
            .filter(|node| **node == CodeNode::Branch(Goto(*resume)))
            .count();
        assert_eq!(gotos, 1, "exactly one `ret` should return to {:?}", resume);
    }
}

#[test]
fn nested_subroutines_multiply() {
    init_logger();
    let body = nested_finally();

    let map = SubroutineMap::compute(&body).unwrap();
    assert_eq!(map.count(), 3);
    assert_eq!(map.subroutine(1).calls, vec![2]);

    let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
    assert_fully_placed(&inlined);

    // 2 outer copies, each with 2 inner copies
    assert_eq!(count(&inlined, &CodeNode::Instruction(AStore(2))), 2);
    assert_eq!(count(&inlined, &CodeNode::Instruction(IInc(0, 1))), 4);
    assert_eq!(resumption_labels(&inlined).len(), 6);

    // Main range, plus the inner range in each outer copy
    assert_eq!(inlined.exception_ranges.len(), 3);
    let positions = inlined.label_positions();
    let mut handlers: Vec<usize> = inlined
        .exception_ranges
        .iter()
        .map(|range| positions[&range.handler])
        .collect();
    handlers.dedup();
    assert_eq!(handlers.len(), 3);
    for range in &inlined.exception_ranges[1..] {
        assert_eq!(
            inlined.nodes[positions[&range.handler] + 1],
            CodeNode::Instruction(AStore(3))
        );
    }
}

#[test]
fn nesting_depth_limit() {
    init_logger();
    let body = nested_finally();

    let settings = InlinerSettings {
        max_nesting_depth: Some(1),
        ..InlinerSettings::default()
    };
    assert!(matches!(
        inline_subroutines(&body, &settings),
        Err(Error::InliningLimitExceeded {
            limit: "max_nesting_depth",
            value: 2,
        })
    ));

    let settings = InlinerSettings {
        max_nesting_depth: Some(2),
        ..InlinerSettings::default()
    };
    assert!(inline_subroutines(&body, &settings).is_ok());
}

#[test]
fn shared_code_resolves_to_outermost_copy() {
    init_logger();

    // Subroutine `b` jumps into code of subroutine `a`, which it was called from. That code
    // (including its exception handler and its `ret`) belongs to both, and should only be
    // emitted in the copy of `a`.
    let mut code = CodeBuilder::new();
    let a = code.label();
    let shared = code.label();
    let protected_start = code.label();
    let protected_end = code.label();
    let handler = code.label();
    let b = code.label();
    code.range(protected_start, protected_end, handler, None)
        .branch(Jsr(a))
        .branch(Return)
        .place(a)
        .insn(AStore(1))
        .branch(Jsr(b))
        .place(shared)
        .place(protected_start)
        .insn(Nop)
        .place(protected_end)
        .branch(Ret(1))
        .place(handler)
        .insn(AStore(3))
        .insn(ALoad(3))
        .branch(AThrow)
        .place(b)
        .insn(AStore(2))
        .branch(Goto(shared));
    let body = code.finish(1, 4);

    let map = SubroutineMap::compute(&body).unwrap();
    assert!(map.is_dual_citizen(7));
    assert_eq!(map.owners(7).collect::<Vec<_>>(), vec![1, 2]);

    let inlined = inline_subroutines(&body, &InlinerSettings::default()).unwrap();
    assert_fully_placed(&inlined);
    let positions = inlined.label_positions();

    // Shared code is emitted once
    let nop = position(&inlined, &CodeNode::Instruction(Nop));
    assert_eq!(count(&inlined, &CodeNode::Instruction(AStore(3))), 1);

    // `ret` returns from `a`, to the main body
    let resumptions = resumption_labels(&inlined);
    assert_eq!(resumptions.len(), 2);
    assert_eq!(inlined.nodes[nop + 2], CodeNode::Branch(Goto(resumptions[0])));

    // `b` jumps back into the copy of `a`
    let store = position(&inlined, &CodeNode::Instruction(AStore(2)));
    match &inlined.nodes[store + 1] {
        CodeNode::Branch(Goto(target)) => assert_eq!(positions[target] + 1, nop),
        other => panic!("expected a goto, got {:?}", other),
    }

    // Only the copy of `a` is covered, and its handler is the one emitted there
    assert_eq!(inlined.exception_ranges.len(), 1);
    let range = &inlined.exception_ranges[0];
    assert!(positions[&range.start] < nop && nop < positions[&range.end]);
    let handler_store = position(&inlined, &CodeNode::Instruction(AStore(3)));
    assert_eq!(positions[&range.handler] + 1, handler_store);
}

#[test]
fn recursion_produces_no_output() {
    init_logger();

    let mut code = CodeBuilder::new();
    let sub = code.label();
    let skip = code.label();
    code.branch(Jsr(sub))
        .branch(Return)
        .place(sub)
        .insn(AStore(1))
        .insn(ILoad(0))
        .branch(If(OrdComparison::EQ, skip))
        .branch(Jsr(sub))
        .place(skip)
        .branch(Ret(1));
    let body = code.finish(1, 2);

    let mut sink = MethodBody::continuing(&body);
    let mut inliner = SubroutineInliner::new(&mut sink);
    match body.accept(&mut inliner) {
        Err(Error::RecursiveSubroutine(entry)) => assert_eq!(entry, sub),
        other => panic!("unexpected result {:?}", other),
    }
    drop(inliner);
    assert!(sink.nodes.is_empty());
    assert!(!sink.is_ended());
}

#[test]
fn inlined_code_can_be_simulated() {
    init_logger();
    let body = nested_finally();
    let header = MethodHeader::parse("Nested", "run", "(I)V", MethodAccessFlags::STATIC).unwrap();

    // Without inlining, the simulator refuses subroutines
    let mut sink = MethodBody::continuing(&body);
    let result = body.accept(&mut Simulator::new(&header, &mut sink));
    assert!(matches!(
        result,
        Err(Error::UnsupportedSubroutineInstruction(_))
    ));

    let mut sink = MethodBody::continuing(&body);
    let mut chain = SubroutineInliner::new(Simulator::new(&header, &mut sink));
    body.accept(&mut chain).unwrap();
    drop(chain);

    assert_fully_placed(&sink);
    assert_eq!(sink.max_locals, 5);
}
