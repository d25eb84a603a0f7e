//! Prints the wire XML of one owner's item box.
//!
//! Usage: `itembox <db_path> <user|building|bank_cell> <owner_id>`

use itembox_core::{Engine, EngineConfig, OwnerRef};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [db_path, kind, id] = args.as_slice() else {
        eprintln!("usage: itembox <db_path> <user|building|bank_cell> <owner_id>");
        return ExitCode::from(2);
    };

    let Some(owner) = id
        .parse::<i64>()
        .ok()
        .and_then(|id| OwnerRef::from_parts(kind, id))
    else {
        eprintln!("invalid owner `{kind}:{id}`");
        return ExitCode::from(2);
    };

    let config = EngineConfig {
        database_path: Some(PathBuf::from(db_path)),
        ..EngineConfig::default()
    };
    let engine = match Engine::start(&config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to open item store: {err}");
            return ExitCode::FAILURE;
        }
    };

    let item_box = engine.load_box(owner, false);
    log::debug!("event=cli_dump module=cli status=ok owner={owner} items={}", item_box.len());
    println!("{}", item_box.to_xml());
    ExitCode::SUCCESS
}
