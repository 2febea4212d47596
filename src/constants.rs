//! Application constants for QARTOD quality control
//!
//! This module contains the canonical flag encoding, reserved configuration
//! keys, default axis column names and helper functions used throughout the
//! crate.

// =============================================================================
// Flag Encoding
// =============================================================================

/// QARTOD primary flag values
pub mod flag_values {
    /// Data passed the test
    pub const PASS: u8 = 1;

    /// Test was not evaluated for this point
    pub const NOT_EVALUATED: u8 = 2;

    /// Data is questionable
    pub const SUSPECT: u8 = 3;

    /// Data failed the test
    pub const FAIL: u8 = 4;

    /// Data value was missing
    pub const MISSING: u8 = 9;

    /// All valid flag values
    pub const ALL_VALUES: &[u8] = &[PASS, NOT_EVALUATED, SUSPECT, FAIL, MISSING];
}

// =============================================================================
// Configuration Keys
// =============================================================================

/// Reserved keys in configuration sources
pub mod config_keys {
    pub const CONTEXTS: &str = "contexts";
    pub const STREAMS: &str = "streams";
    pub const REGION: &str = "region";
    pub const WINDOW: &str = "window";
    pub const ATTRS: &str = "attrs";
    pub const STARTING: &str = "starting";
    pub const ENDING: &str = "ending";

    /// Keys whose presence marks a context rather than a bare stream mapping
    pub const CONTEXT_MARKERS: &[&str] = &[STREAMS, REGION, WINDOW];
}

/// Test module names
pub mod modules {
    pub const QARTOD: &str = "qartod";
    pub const ARGO: &str = "argo";
}

// =============================================================================
// Axis Column Names
// =============================================================================

/// Default axis column names used by the stream adapters
pub mod columns {
    pub const TIME: &str = "time";
    pub const Z: &str = "z";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const GEOM: &str = "geom";
}

/// Suffix of the configuration sidecar written next to stored results
pub const CONFIG_SIDECAR_SUFFIX: &str = ".qc.json";

/// Name given to collected-level rollup results
pub const ROLLUP_TEST_NAME: &str = "rollup";

// =============================================================================
// Command-Line Defaults
// =============================================================================

/// Directory that results land in when no output path is given
pub const DEFAULT_OUTPUT_DIR: &str = "qc_output";

/// Appended to an input file stem to name its results file
pub const RESULTS_FILE_SUFFIX: &str = "_qc";

// =============================================================================
// Physical Constants
// =============================================================================

/// Mean Earth radius in metres, used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Approximate metres per degree of latitude
pub const METRES_PER_DEGREE: f64 = 111_195.0;

// =============================================================================
// Helper Functions
// =============================================================================

/// Get flag description for human-readable output
pub fn flag_description(flag: u8) -> &'static str {
    match flag {
        flag_values::PASS => "Pass - data passed the test",
        flag_values::NOT_EVALUATED => "Not evaluated - test could not be applied",
        flag_values::SUSPECT => "Suspect - data is questionable",
        flag_values::FAIL => "Fail - data failed the test",
        flag_values::MISSING => "Missing - no data value",
        _ => "Unknown flag",
    }
}

/// Check if a key in a configuration mapping marks a context
pub fn is_context_marker(key: &str) -> bool {
    config_keys::CONTEXT_MARKERS.contains(&key)
}
