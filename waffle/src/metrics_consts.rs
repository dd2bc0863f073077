// Decision counters
pub const FLAG_DECISIONS_COUNTER: &str = "waffle_flag_decisions_total";
pub const SWITCH_CHECKS_COUNTER: &str = "waffle_switch_checks_total";
pub const SAMPLE_CHECKS_COUNTER: &str = "waffle_sample_checks_total";
pub const INVALID_DEFINITIONS_COUNTER: &str = "waffle_invalid_definitions_total";

// Record cache
pub const RECORD_CACHE_HIT_COUNTER: &str = "waffle_record_cache_hit_total";
pub const RECORD_CACHE_MISS_COUNTER: &str = "waffle_record_cache_miss_total";
pub const CACHE_INVALIDATIONS_COUNTER: &str = "waffle_cache_invalidations_total";
pub const STORE_ERRORS_COUNTER: &str = "waffle_store_errors_total";

// Missing records
pub const MISSING_RECORDS_COUNTER: &str = "waffle_missing_records_total";
pub const RECORDS_CREATED_COUNTER: &str = "waffle_records_created_total";
