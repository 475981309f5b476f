//! Symbols woven code links against
//!
//! These names and descriptors are the contract between the weaver, which
//! emits calls to them, and the runtime, which resolves them to
//! [`Metrics`](crate::Metrics) and [`ReturnCapture`](crate::ReturnCapture).

/// Module a woven unit must import to reach the facade
pub const FACADE_MODULE: &str = "raya.metrics";

/// Facade type (internal form)
pub const METRICS_CLASS: &str = "raya/metrics/Metrics";

/// Timer handle interface (internal form)
pub const TIMER_CONTEXT_CLASS: &str = "raya/metrics/TimerContext";

/// Capture functions type (internal form)
pub const RETURN_CAPTURE_CLASS: &str = "raya/metrics/ReturnCapture";

/// String type (internal form)
pub const STRING_CLASS: &str = "raya/lang/String";

/// `startTimer`
pub const START_TIMER: &str = "startTimer";
/// Descriptor of `startTimer`
pub const START_TIMER_DESC: &str = "(Lraya/lang/String;)Lraya/metrics/TimerContext;";

/// `TimerContext.stop`
pub const STOP: &str = "stop";
/// Descriptor of `stop`
pub const STOP_DESC: &str = "()V";

/// `count`
pub const COUNT: &str = "count";
/// `mark`
pub const MARK: &str = "mark";
/// `startAPICount`
pub const START_API_COUNT: &str = "startAPICount";
/// `endAPICount`
pub const END_API_COUNT: &str = "endAPICount";
/// Descriptor shared by `count`, `mark` and the guarded counts
pub const NAME_ONLY_DESC: &str = "(Lraya/lang/String;)V";

/// `countCapture`
pub const COUNT_CAPTURE: &str = "countCapture";
/// `markCapture`
pub const MARK_CAPTURE: &str = "markCapture";
/// `countCaptureUsingHelper`
pub const COUNT_CAPTURE_HELPER: &str = "countCaptureUsingHelper";
/// `markCaptureUsingHelper`
pub const MARK_CAPTURE_HELPER: &str = "markCaptureUsingHelper";

/// Parameter type the returned value is passed as, by return descriptor
///
/// int-category returns are widened to `I`; arrays and objects pass as
/// `Lraya/lang/Object;`. Returns `None` for `V`.
pub fn capture_value_type(return_descriptor: &str) -> Option<&'static str> {
    match return_descriptor.as_bytes().first()? {
        b'I' | b'Z' | b'B' | b'C' | b'S' => Some("I"),
        b'J' => Some("J"),
        b'F' => Some("F"),
        b'D' => Some("D"),
        b'L' | b'[' => Some("Lraya/lang/Object;"),
        _ => None,
    }
}

/// Descriptor of a capture function for `value_type`
pub fn capture_descriptor(value_type: &str, with_key: bool) -> String {
    if with_key {
        format!("({}Lraya/lang/String;Lraya/lang/String;)V", value_type)
    } else {
        format!("({}Lraya/lang/String;)V", value_type)
    }
}
