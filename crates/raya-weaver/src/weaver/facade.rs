//! Instructions calling into the metrics runtime

use raya_classfile::{ConstantPool, Insn, Node, Opcode, PoolFull};
use raya_metrics::symbols;

/// Emits runtime calls, interning their constants in the unit's pool
pub(crate) struct FacadeCalls<'p> {
    pool: &'p mut ConstantPool,
}

impl<'p> FacadeCalls<'p> {
    pub(crate) fn new(pool: &'p mut ConstantPool) -> Self {
        Self { pool }
    }

    /// Push a string constant
    pub(crate) fn string(&mut self, value: &str) -> Result<Node, PoolFull> {
        Ok(Insn::constant(Opcode::Ldc, self.pool.add_string(value)?).into())
    }

    /// `Metrics.<method>(String)` with the facade descriptor `descriptor`
    pub(crate) fn metrics(&mut self, method: &str, descriptor: &str) -> Result<Node, PoolFull> {
        let index = self
            .pool
            .add_method(symbols::METRICS_CLASS, method, descriptor, false)?;
        Ok(Insn::constant(Opcode::InvokeStatic, index).into())
    }

    /// `TimerContext.stop()` on the handle on top of the stack
    pub(crate) fn stop(&mut self) -> Result<Node, PoolFull> {
        let index = self.pool.add_method(
            symbols::TIMER_CONTEXT_CLASS,
            symbols::STOP,
            symbols::STOP_DESC,
            true,
        )?;
        Ok(Insn::constant(Opcode::InvokeInterface, index).into())
    }

    /// `ReturnCapture.<function>` with `descriptor`
    pub(crate) fn capture(&mut self, function: &str, descriptor: &str) -> Result<Node, PoolFull> {
        let index = self
            .pool
            .add_method(symbols::RETURN_CAPTURE_CLASS, function, descriptor, false)?;
        Ok(Insn::constant(Opcode::InvokeStatic, index).into())
    }

    /// Named facade call: push `metric`, call `Metrics.<method>(String)V`
    pub(crate) fn named(&mut self, method: &str, metric: &str) -> Result<[Node; 2], PoolFull> {
        Ok([self.string(metric)?, self.metrics(method, symbols::NAME_ONLY_DESC)?])
    }
}
