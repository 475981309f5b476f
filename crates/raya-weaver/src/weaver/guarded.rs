//! Guarded (outermost-call) counter probe

use super::facade::FacadeCalls;
use super::{at_entry, before_each, on_exceptional_exit, WeaveOptions};
use raya_classfile::{InsnList, Node, Opcode, PoolFull};
use raya_metrics::symbols;

pub(super) fn weave(
    list: &mut InsnList,
    calls: &mut FacadeCalls<'_>,
    metric: &str,
    options: WeaveOptions,
) -> Result<(), PoolFull> {
    let start = list.new_label();
    let mut entry = calls.named(symbols::START_API_COUNT, metric)?.to_vec();
    if options.exceptional_exits {
        entry.push(Node::Label(start));
    }
    let exit = calls.named(symbols::END_API_COUNT, metric)?;

    if options.exceptional_exits {
        before_each(list, Opcode::is_return, &exit);
        at_entry(list, entry);
        on_exceptional_exit(list, start, &exit);
    } else {
        before_each(list, |op| op.is_return() || op == Opcode::AThrow, &exit);
        at_entry(list, entry);
    }
    Ok(())
}
