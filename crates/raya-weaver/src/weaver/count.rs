//! Counter and meter probes: one facade call at method entry

use super::facade::FacadeCalls;
use super::at_entry;
use raya_classfile::{InsnList, PoolFull};

pub(super) fn weave(
    list: &mut InsnList,
    calls: &mut FacadeCalls<'_>,
    function: &str,
    metric: &str,
) -> Result<(), PoolFull> {
    at_entry(list, calls.named(function, metric)?.to_vec());
    Ok(())
}
