//! Timer probe
//!
//! Entry starts a timer and keeps its handle in a fresh local; every normal
//! return stops it. With exceptional exits enabled a catch-all handler stops
//! the timer and rethrows.

use super::facade::FacadeCalls;
use super::{at_entry, before_each, on_exceptional_exit, WeaveOptions};
use raya_classfile::{Insn, InsnList, Node, Opcode, PoolFull};
use raya_metrics::symbols;

pub(super) fn weave(
    list: &mut InsnList,
    calls: &mut FacadeCalls<'_>,
    metric: &str,
    slot: u16,
    options: WeaveOptions,
) -> Result<(), PoolFull> {
    let start = list.new_label();
    let mut entry = vec![
        calls.string(metric)?,
        calls.metrics(symbols::START_TIMER, symbols::START_TIMER_DESC)?,
        Insn::local(Opcode::AStore, slot).into(),
    ];
    if options.exceptional_exits {
        entry.push(Node::Label(start));
    }

    let exit = [Insn::local(Opcode::ALoad, slot).into(), calls.stop()?];
    before_each(list, Opcode::is_return, &exit);
    at_entry(list, entry);
    if options.exceptional_exits {
        on_exceptional_exit(list, start, &exit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{weave_method, WeaveOptions};
    use crate::matcher::{InstrumentationRule, RuleKind};
    use crate::names::MetricName;
    use raya_classfile::{verify_method, ClassUnit, FrameComputer, MethodContext, Opcode, RootOnly, VType};

    fn woven(options: WeaveOptions, is_static: bool) -> ClassUnit {
        let mut unit = ClassUnit::new("app/Store", Some("raya/lang/Object"));
        add_method(&mut unit, "size", if is_static { "(II)I" } else { "(I)I" }, is_static, branching_int);
        let rule = InstrumentationRule {
            kind: RuleKind::Timer,
            key: None,
        };
        let metric = MetricName::new(&"app.Store".into(), "size", None);
        let mut method = unit.methods[0].clone();
        weave_method(&mut unit.constants, &mut method, &rule, &metric, options).unwrap();

        let ctx = MethodContext {
            owner: "app/Store",
            descriptor: &method.descriptor,
            is_static: method.is_static(),
            pool: &unit.constants,
        };
        let mut code = method.code.clone().unwrap();
        FrameComputer::new(&RootOnly).apply(&ctx, &mut code).unwrap();
        method.code = Some(code);
        unit.methods[0] = method;
        verify_method(&unit, &unit.methods[0]).unwrap();
        unit
    }

    #[test]
    fn test_timer_stops_on_every_return() {
        let unit = woven(
            WeaveOptions {
                exceptional_exits: false,
            },
            false,
        );
        let code = unit.methods[0].code.as_ref().unwrap();
        use Opcode::*;
        assert_eq!(
            opcodes(code),
            vec![
                Ldc, InvokeStatic, AStore, ILoad, IfNe, IConst, ALoad, InvokeInterface, IReturn, ILoad, ALoad,
                InvokeInterface, IReturn
            ]
        );
        assert_eq!(invoked(&unit, code), vec!["startTimer", "stop", "stop"]);
        assert!(code.handlers.is_empty());
        // The handle lives in the first slot after the parameters.
        assert_eq!(code.max_locals, 5);
    }

    #[test]
    fn test_timer_stops_on_exceptional_exit() {
        let unit = woven(WeaveOptions::default(), false);
        let code = unit.methods[0].code.as_ref().unwrap();
        let ops = opcodes(code);
        assert_eq!(&ops[ops.len() - 3..], &[Opcode::ALoad, Opcode::InvokeInterface, Opcode::AThrow]);
        assert_eq!(invoked(&unit, code), vec!["startTimer", "stop", "stop", "stop"]);

        assert_eq!(code.handlers.len(), 1);
        let handler = code.handlers[0];
        assert_eq!(handler.catch_type, None);
        // Covers the original body, not the timer start.
        assert_eq!(handler.start, 9);
        assert_eq!(handler.end, handler.handler);

        let frame = code.frames.iter().find(|f| f.offset == handler.handler).unwrap();
        assert_eq!(frame.stack, vec![VType::Object("raya/lang/Throwable".into())]);
        assert_eq!(frame.locals[4], VType::Object("raya/metrics/TimerContext".into()));
    }

    #[test]
    fn test_timer_slot_for_static_method() {
        let unit = woven(WeaveOptions::default(), true);
        let code = unit.methods[0].code.as_ref().unwrap();
        let slots: Vec<_> = raya_classfile::decode_instructions(&code.bytes)
            .unwrap()
            .into_iter()
            .filter(|i| i.opcode == Opcode::AStore)
            .map(|i| i.operand)
            .collect();
        assert_eq!(slots, vec![raya_classfile::Operand::Local(4)]);
    }
}
