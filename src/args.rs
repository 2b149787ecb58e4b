//! Flag parsing shared by the binaries. Every flag accepts both `--name value`
//! and `--name=value`.

use std::path::PathBuf;

fn cli_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Raw value of `name` in `args`, if present and non-empty.
pub fn find_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn parse_string_arg(name: &str) -> Option<String> {
    find_value(&cli_args(), name)
}

pub fn parse_db_path_arg() -> Option<PathBuf> {
    parse_string_arg("--db").map(PathBuf::from)
}

pub fn parse_models_dir_arg() -> Option<PathBuf> {
    parse_string_arg("--models").map(PathBuf::from)
}

pub fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_string_arg(name).and_then(|raw| raw.parse::<usize>().ok())
}

pub fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_string_arg(name).and_then(|raw| raw.parse::<u64>().ok())
}

/// Comma separated list, blanks dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_list_arg(name: &str) -> Option<Vec<String>> {
    parse_string_arg(name)
        .map(|raw| split_list(&raw))
        .filter(|items| !items.is_empty())
}

pub fn has_flag(name: &str) -> bool {
    cli_args().iter().any(|arg| arg == name)
}
