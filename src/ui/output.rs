use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().title.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().passed.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failed.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().caution.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().key.clone()), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().title.clone()));
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().key.clone()), value);
}

/// Split `#12=IFCWALL(...)` into id, keyword and argument list.
fn split_record(line: &str) -> Option<(&str, &str, &str)> {
    let (id, tail) = line.split_once('=')?;
    if !id.starts_with('#') {
        return None;
    }
    let open = tail.find('(')?;
    Some((id, &tail[..open], &tail[open..]))
}

/// Print one record with its id and keyword highlighted.
pub fn record(indent: &str, line: &str) {
    match split_record(line) {
        Some((id, keyword, arguments)) => println!(
            "{}{}={}{}",
            indent,
            id.style(theme().id.clone()),
            keyword.style(theme().keyword.clone()),
            arguments
        ),
        None => println!("{}{}", indent, line),
    }
}
