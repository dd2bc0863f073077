pub mod bucketing;
pub mod decision;
pub mod flag_matching;
pub mod flag_models;
pub mod rules;
