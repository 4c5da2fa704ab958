pub mod call_record;
pub mod download;
pub mod lead;
pub mod sync_run;
