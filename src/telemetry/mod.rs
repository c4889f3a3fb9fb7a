pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

pub fn fetch() -> LogCtx<ops::fetch::Fetch> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn serve() -> LogCtx<ops::serve::Serve> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn personas() -> LogCtx<ops::personas::Personas> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
