mod store;
mod utils;

pub use store::{RecordStore, DEFAULT_STATE_DIR};
pub use utils::{
    controller, distributor, parse_spec, read_spec_file, summarize, with_timeout, Controller,
    Distributor,
};
