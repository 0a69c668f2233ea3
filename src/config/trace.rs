use serde::Deserialize;
use serde::Serialize;

bitflags::bitflags! {
    /// Engine diagnostic verbosity
    ///
    /// Without flags the engine logs at `debug` and omits keys and values.
    /// In configuration the set is written by flag name, e.g. `"EXECUTION | KEYS"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TraceFlags: u32 {
        /// Log every engine call at `info`
        const EXECUTION = 1;
        /// Include keys in engine logs
        const KEYS = 1 << 1;
        /// Include values in engine logs
        const VALUES = 1 << 2;
        /// Log every record a read or listing returns
        const EXPAND_RESULTS = 1 << 3;
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        TraceFlags::empty()
    }
}
