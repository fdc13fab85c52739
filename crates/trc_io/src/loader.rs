//! [MODULE D] Document reader: recursive descent over `xml_events` that
//! builds a `trc_core::db::Database` plus the `LoadedDocument` side table.
//!
//! Element vocabulary: `trc_db > test* ; test > objective, notes, iter* ;
//! iter > arg*, notes, results*, test* ; results > result* ; result >
//! verdict*`, plus `globals > global*` and `xinclude_start`/`xinclude_end`
//! markers anywhere a `test` or `iter` may appear.

use std::fs;
use std::iter::Peekable;
use std::path::Path;

use trc_core::db::{Database, IterId, TestId, TestKind};
use trc_core::result::{ExpectedAlternative, ExpectedResultEntry, ObservedResult, TestStatus, Verdict};
use trc_core::tag::TagExpr;

use crate::doc::{LoadedDocument, MarkerAnchor, MarkerKind};
use crate::xml_events::{XmlEvent, XmlEvents};
use crate::{IoError, IoResult};

pub fn load_file(path: &Path) -> IoResult<(Database, LoadedDocument)> {
    let text = fs::read_to_string(path)?;
    load_str(&text).map_err(|e| match e {
        IoError::Malformed { path: _, msg } => IoError::Malformed { path: path.display().to_string(), msg },
        other => other,
    })
}

pub fn load_str(xml: &str) -> IoResult<(Database, LoadedDocument)> {
    let mut events = XmlEvents::new(xml).peekable();
    let mut db = Database::new();
    let mut doc = LoadedDocument::new();

    let (name, _attrs, empty) = expect_start(&mut events)?;
    if name != "trc_db" || empty {
        return Err(malformed("trc_db", "expected a <trc_db> root element"));
    }

    let mut index = 0usize;
    loop {
        match events.peek() {
            None => return Err(malformed("trc_db", "unexpected end of document")),
            Some(Ok(XmlEvent::End { name })) if name == "trc_db" => {
                events.next();
                break;
            }
            _ => {}
        }
        let (name, attrs, empty) = expect_start(&mut events)?;
        match name.as_str() {
            "test" => {
                parse_test(&mut events, &mut db, &mut doc, None, &attrs, empty)?;
                index += 1;
            }
            "xinclude_start" => {
                if !empty {
                    consume_to_end(&mut events, &name)?;
                }
                doc.push_marker(MarkerAnchor::Tests(None), index, MarkerKind::Start);
            }
            "xinclude_end" => {
                if !empty {
                    consume_to_end(&mut events, &name)?;
                }
                doc.push_marker(MarkerAnchor::Tests(None), index, MarkerKind::End);
            }
            "globals" => {
                if !empty {
                    parse_globals(&mut events, &mut doc)?;
                }
            }
            _ => {
                if !empty {
                    consume_to_end(&mut events, &name)?;
                }
            }
        }
    }

    Ok((db, doc))
}

type Events<'a> = Peekable<XmlEvents<'a>>;

fn expect_start(events: &mut Events) -> IoResult<(String, Vec<(String, String)>, bool)> {
    match events.next() {
        Some(Ok(XmlEvent::Start { name, attrs, empty })) => Ok((name, attrs, empty)),
        Some(Ok(other)) => Err(malformed("document", format!("expected an element start, found {other:?}"))),
        Some(Err(e)) => Err(e),
        None => Err(malformed("document", "unexpected end of document")),
    }
}

fn expect_end(events: &mut Events, expected: &str) -> IoResult<()> {
    match events.next() {
        Some(Ok(XmlEvent::End { name })) if name == expected => Ok(()),
        Some(Ok(other)) => Err(malformed(expected, format!("expected </{expected}>, found {other:?}"))),
        Some(Err(e)) => Err(e),
        None => Err(malformed(expected, "unexpected end of document")),
    }
}

/// Read accumulated text up to (and consuming) the matching end tag.
fn read_text_until_end(events: &mut Events, name: &str) -> IoResult<String> {
    let mut text = String::new();
    loop {
        match events.next() {
            Some(Ok(XmlEvent::Text(t))) => text.push_str(&t),
            Some(Ok(XmlEvent::End { name: end })) if end == name => return Ok(text),
            Some(Ok(other)) => return Err(malformed(name, format!("unexpected nested content: {other:?}"))),
            Some(Err(e)) => return Err(e),
            None => return Err(malformed(name, "unexpected end of document")),
        }
    }
}

/// Skip a subtree whose start tag has already been consumed, tracking
/// nested element depth.
fn consume_to_end(events: &mut Events, name: &str) -> IoResult<()> {
    let mut depth = 1u32;
    loop {
        match events.next() {
            Some(Ok(XmlEvent::Start { empty, .. })) => {
                if !empty {
                    depth += 1;
                }
            }
            Some(Ok(XmlEvent::End { .. })) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Some(Ok(XmlEvent::Text(_))) => {}
            Some(Err(e)) => return Err(e),
            None => return Err(malformed(name, "unexpected end of document while skipping")),
        }
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn malformed(path: impl Into<String>, msg: impl Into<String>) -> IoError {
    IoError::Malformed { path: path.into(), msg: msg.into() }
}

fn parse_globals(events: &mut Events, doc: &mut LoadedDocument) -> IoResult<()> {
    loop {
        match events.peek() {
            Some(Ok(XmlEvent::End { name })) if name == "globals" => {
                events.next();
                return Ok(());
            }
            _ => {}
        }
        let (name, attrs, empty) = expect_start(events)?;
        if name != "global" {
            if !empty {
                consume_to_end(events, &name)?;
            }
            continue;
        }
        let key = attr(&attrs, "name").ok_or_else(|| malformed("global", "missing name attribute"))?.to_string();
        let value = if empty { String::new() } else { read_text_until_end(events, "global")? };
        doc.globals.push((key, value));
    }
}

fn parse_test(
    events: &mut Events,
    db: &mut Database,
    doc: &mut LoadedDocument,
    parent: Option<IterId>,
    attrs: &[(String, String)],
    empty: bool,
) -> IoResult<TestId> {
    let name = attr(attrs, "name").ok_or_else(|| malformed("test", "missing name attribute"))?.to_string();
    let kind_str = attr(attrs, "type").unwrap_or("script");
    let kind = TestKind::parse(kind_str).ok_or_else(|| IoError::UnknownTestKind(kind_str.to_string()))?;
    let id = match parent {
        Some(p) => db.loader_insert_child_test(p, name.clone(), kind),
        None => db.loader_insert_root_test(name.clone(), kind),
    };
    if matches!(attr(attrs, "auxiliary"), Some("true") | Some("1")) {
        db.test_mut(id).auxiliary = true;
    }
    if empty {
        return Ok(id);
    }

    let mut iter_index = 0usize;
    loop {
        match events.peek() {
            Some(Ok(XmlEvent::End { name: end })) if end == "test" => {
                events.next();
                break;
            }
            _ => {}
        }
        let (child_name, child_attrs, child_empty) = expect_start(events)?;
        match child_name.as_str() {
            "objective" => {
                let text = if child_empty { String::new() } else { read_text_until_end(events, "objective")? };
                db.test_mut(id).objective = text;
            }
            "notes" => {
                let text = if child_empty { String::new() } else { read_text_until_end(events, "notes")? };
                db.test_mut(id).notes = if text.trim().is_empty() { None } else { Some(text) };
            }
            "iter" => {
                parse_iter(events, db, doc, id, &child_attrs, child_empty)?;
                iter_index += 1;
            }
            "xinclude_start" => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                doc.push_marker(MarkerAnchor::Iters(id), iter_index, MarkerKind::Start);
            }
            "xinclude_end" => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                doc.push_marker(MarkerAnchor::Iters(id), iter_index, MarkerKind::End);
            }
            _ => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
            }
        }
    }
    Ok(id)
}

fn parse_iter(
    events: &mut Events,
    db: &mut Database,
    doc: &mut LoadedDocument,
    test: TestId,
    attrs: &[(String, String)],
    empty: bool,
) -> IoResult<IterId> {
    let id = db.loader_insert_iter(test, Vec::new());

    if let Some(status_str) = attr(attrs, "result") {
        let status = TestStatus::from_str_opt(status_str).ok_or_else(|| IoError::UnknownStatus(status_str.to_string()))?;
        db.iter_mut(id)
            .expected
            .set_default(vec![ExpectedResultEntry::new(ObservedResult::new(status))])?;
    }

    if empty {
        return Ok(id);
    }

    let mut test_index = 0usize;
    loop {
        match events.peek() {
            Some(Ok(XmlEvent::End { name })) if name == "iter" => {
                events.next();
                break;
            }
            _ => {}
        }
        let (child_name, child_attrs, child_empty) = expect_start(events)?;
        match child_name.as_str() {
            "arg" => {
                let arg_name = attr(&child_attrs, "name").ok_or_else(|| malformed("arg", "missing name attribute"))?.to_string();
                let value = if child_empty { String::new() } else { read_text_until_end(events, "arg")? };
                db.iter_mut(id).args.push((arg_name, value));
            }
            "notes" => {
                let text = if child_empty { String::new() } else { read_text_until_end(events, "notes")? };
                db.iter_mut(id).notes = if text.trim().is_empty() { None } else { Some(text) };
            }
            "results" => {
                let alt = parse_results_block(events, &child_attrs, child_empty)?;
                db.iter_mut(id).expected.push_alternative(alt);
            }
            "test" => {
                parse_test(events, db, doc, Some(id), &child_attrs, child_empty)?;
                test_index += 1;
            }
            "xinclude_start" => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                doc.push_marker(MarkerAnchor::Tests(Some(id)), test_index, MarkerKind::Start);
            }
            "xinclude_end" => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                doc.push_marker(MarkerAnchor::Tests(Some(id)), test_index, MarkerKind::End);
            }
            _ => {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
            }
        }
    }
    Ok(id)
}

fn parse_results_block(events: &mut Events, attrs: &[(String, String)], empty: bool) -> IoResult<ExpectedAlternative> {
    let tags = attr(attrs, "tags").ok_or_else(|| malformed("results", "missing tags attribute"))?;
    let predicate = TagExpr::parse(tags)?;
    let key = attr(attrs, "key").map(str::to_string);
    let notes = attr(attrs, "notes").map(str::to_string);
    let mut entries = Vec::new();

    if !empty {
        loop {
            match events.peek() {
                Some(Ok(XmlEvent::End { name })) if name == "results" => {
                    events.next();
                    break;
                }
                _ => {}
            }
            let (child_name, child_attrs, child_empty) = expect_start(events)?;
            if child_name != "result" {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                continue;
            }
            entries.push(parse_result_entry(events, &child_attrs, child_empty)?);
        }
    }

    Ok(ExpectedAlternative { predicate, entries, key, notes })
}

fn parse_result_entry(events: &mut Events, attrs: &[(String, String)], empty: bool) -> IoResult<ExpectedResultEntry> {
    let status_str = attr(attrs, "value").ok_or_else(|| malformed("result", "missing value attribute"))?;
    let status = TestStatus::from_str_opt(status_str).ok_or_else(|| IoError::UnknownStatus(status_str.to_string()))?;
    let key = attr(attrs, "key").map(str::to_string);
    let notes = attr(attrs, "notes").map(str::to_string);
    let mut verdicts = Vec::new();

    if !empty {
        loop {
            match events.peek() {
                Some(Ok(XmlEvent::End { name })) if name == "result" => {
                    events.next();
                    break;
                }
                _ => {}
            }
            let (child_name, _child_attrs, child_empty) = expect_start(events)?;
            if child_name != "verdict" {
                if !child_empty {
                    consume_to_end(events, &child_name)?;
                }
                continue;
            }
            let text = if child_empty { String::new() } else { read_text_until_end(events, "verdict")? };
            verdicts.push(Verdict(text));
        }
    }

    Ok(ExpectedResultEntry { result: ObservedResult::with_verdicts(status, verdicts), key, notes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_test_with_iteration_and_alternative() {
        let xml = r#"<trc_db>
          <test name="suite" type="package">
            <objective>obj</objective>
            <notes/>
            <iter result="PASSED">
              <arg name="a">1</arg>
              <notes/>
              <results tags="linux">
                <result value="FAILED" key="BUG-1">
                  <verdict>oops</verdict>
                </result>
              </results>
            </iter>
          </test>
        </trc_db>"#;
        let (db, _doc) = load_str(xml).unwrap();
        assert_eq!(db.roots().len(), 1);
        let t = db.roots()[0];
        assert_eq!(db.test(t).name, "suite");
        assert_eq!(db.test(t).objective, "obj");
        let iter = db.test(t).iterations[0];
        assert_eq!(db.iter(iter).args, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(db.iter(iter).expected.alternatives.len(), 1);
        let default = db.iter(iter).expected.default.as_ref().unwrap();
        assert_eq!(default[0].result.status, TestStatus::Passed);
    }

    #[test]
    fn include_markers_are_recorded_at_root_position() {
        let xml = r#"<trc_db>
          <test name="a" type="script"/>
          <xinclude_start/>
          <test name="b" type="script"/>
          <xinclude_end/>
        </trc_db>"#;
        let (_db, doc) = load_str(xml).unwrap();
        assert_eq!(doc.markers.len(), 2);
        assert_eq!(doc.markers[0].index, 1);
        assert_eq!(doc.markers[1].index, 2);
    }

    #[test]
    fn unknown_status_is_a_structured_error() {
        let xml = r#"<trc_db>
          <test name="a" type="script">
            <iter result="NOT_A_STATUS"/>
          </test>
        </trc_db>"#;
        assert!(load_str(xml).is_err());
    }
}
