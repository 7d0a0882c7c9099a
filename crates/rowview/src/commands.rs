use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use rowview_app::{RecordSource, ViewSelection};
use rowview_core::{Record, RecordId};
use rowview_store_json::RecordDoc;

use crate::Command;

pub fn run<S, W>(command: Command, view: &ViewSelection<S>, out: &mut W) -> Result<()>
where
    S: RecordSource<Entry = Record> + 'static,
    W: Write,
{
    match command {
        Command::Size => writeln!(out, "{}", view.size()?)?,
        Command::Page {
            offset,
            length,
            orders,
        } => {
            let page = view.get_page(offset, length, &orders)?;
            for row in &page.rows {
                write_row(out, row)?;
            }
        }
        Command::Show { id } => {
            let row = view.get_by_id(&RecordId::new(id))?;
            let doc = RecordDoc::from(row.as_ref());
            writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
        }
        Command::Tree => {
            let snapshot = view.snapshot()?;
            for row in snapshot.top_level() {
                write_tree(out, row, 0)?;
            }
        }
        Command::Select { barcode, selected } => {
            let selected: BTreeSet<RecordId> = selected.into_iter().map(RecordId::new).collect();
            let action = view.select_by_barcode(&barcode, &selected)?;
            for id in &action.row_ids {
                writeln!(out, "{id}")?;
            }
        }
        Command::Add { json } => {
            let doc: RecordDoc = serde_json::from_str(&json).context("row must be a JSON object")?;
            view.add_record(Some(Record::from(&doc)))?;
            writeln!(out, "Added {}", doc.id)?;
        }
        Command::Remove { ids } => {
            let ids: BTreeSet<RecordId> = ids.into_iter().map(RecordId::new).collect();
            let entries = view.get_by_ids(&ids)?;
            let entries: Vec<Record> = entries.iter().map(|row| row.as_ref().clone()).collect();
            view.remove_records(&entries)?;
            writeln!(out, "Removed {}", entries.len())?;
        }
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, row: &Record) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(&RecordDoc::from(row))?)?;
    Ok(())
}

fn write_tree<W: Write>(out: &mut W, row: &Record, depth: usize) -> Result<()> {
    let fields: Vec<String> = row
        .fields()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    writeln!(out, "{:indent$}{} {}", "", row.id(), fields.join(" "), indent = depth * 2)?;
    for child in row.children() {
        write_tree(out, child, depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use rowview_app::OrderSpec;
    use rowview_store_json::JsonFileSource;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const SEED: &str = r#"{"records":[
        {"id":1,"fields":{"name":"A","barcode":"PAL-1"},"children":[{"id":2,"fields":{"name":"inner"}}]},
        {"id":3,"fields":{"name":"B"}},
        {"id":4,"fields":{"name":"C"}}
    ]}"#;

    fn view() -> (TempDir, ViewSelection<JsonFileSource>) {
        let dir = TempDir::with_prefix("rowview-cli-test-").unwrap();
        let path = dir.path().join("rows.json");
        fs::write(&path, SEED).unwrap();
        let view = ViewSelection::builder()
            .source(Arc::new(JsonFileSource::open(path)))
            .build()
            .unwrap();
        (dir, view)
    }

    fn output(command: Command, view: &ViewSelection<JsonFileSource>) -> String {
        let mut buf = Vec::new();
        run(command, view, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn size_counts_top_level_rows() {
        let (_dir, view) = view();
        assert_eq!(output(Command::Size, &view), "3\n");
    }

    #[test]
    fn page_prints_sorted_rows() {
        let (_dir, view) = view();
        let text = output(
            Command::Page {
                offset: 1,
                length: 2,
                orders: vec![OrderSpec::desc("name")],
            },
            &view,
        );
        let ids: Vec<&str> = text.lines().map(|line| &line[..8]).collect();
        assert_eq!(ids, [r#"{"id":4,"#, r#"{"id":3,"#]);
    }

    #[test]
    fn tree_indents_children() {
        let (_dir, view) = view();
        let text = output(Command::Tree, &view);
        assert!(text.starts_with("1 barcode=PAL-1 name=A\n  2 name=inner\n3 name=B\n"));
    }

    #[test]
    fn add_and_remove_round_trip_through_the_file() {
        let (_dir, view) = view();
        output(
            Command::Add {
                json: r#"{"id":9,"fields":{"name":"Z"}}"#.into(),
            },
            &view,
        );
        assert_eq!(output(Command::Size, &view), "4\n");

        let text = output(
            Command::Remove {
                ids: vec!["9".into(), "3".into(), "77".into()],
            },
            &view,
        );
        assert_eq!(text, "Removed 2\n");
        assert_eq!(output(Command::Size, &view), "2\n");
    }

    #[test]
    fn select_reports_misses() {
        let (_dir, view) = view();
        assert_eq!(
            output(
                Command::Select {
                    barcode: "pal".into(),
                    selected: vec!["4".into()],
                },
                &view,
            ),
            "1\n4\n"
        );

        let mut buf = Vec::new();
        let err = run(
            Command::Select {
                barcode: "nope".into(),
                selected: Vec::new(),
            },
            &view,
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Nothing found for 'nope'");
    }
}
