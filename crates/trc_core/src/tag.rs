//! [MODULE A] Tag logic: tags, tag sets, and the propositional predicate language.
//!
//! Grammar (see `tag_expr.pest`): atoms `NAME` or `NAME:VALUE`, unary `!`,
//! binary `&` / `|`, parentheses, left-associative, `!` > `&` > `|`.

use std::collections::BTreeSet;
use std::fmt;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::{CoreError, CoreResult};

#[derive(Parser)]
#[grammar = "tag_expr.pest"]
struct TagExprParser;

/// A single tag in the active set: either a bare name or `name:value`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    pub name: String,
    pub value: Option<String>,
}

impl Tag {
    pub fn parse(s: &str) -> Tag {
        match s.split_once(':') {
            Some((name, value)) => Tag { name: name.to_string(), value: Some(value.to_string()) },
            None => Tag { name: s.to_string(), value: None },
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}:{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The active tag set during log ingestion: unique by tag name, a later
/// `name:v2` supersedes an earlier `name:v1` (mirrors `trc_add_tag` in the
/// original TE sources).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagSet {
    by_name: std::collections::BTreeMap<String, Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, normalizing `name[:value]`. A later tag with the same
    /// name replaces the earlier one's value.
    pub fn insert(&mut self, raw: &str) {
        let tag = Tag::parse(raw.trim());
        if tag.name.is_empty() {
            return;
        }
        self.by_name.insert(tag.name.clone(), tag);
    }

    pub fn from_iter<'a, I: IntoIterator<Item = &'a str>>(it: I) -> Self {
        let mut set = Self::new();
        for s in it {
            set.insert(s);
        }
        set
    }

    pub fn contains_literal(&self, atom: &Tag) -> bool {
        match self.by_name.get(&atom.name) {
            None => false,
            Some(present) => match &atom.value {
                None => true,
                Some(v) => present.value.as_deref() == Some(v.as_str()),
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// A parsed tag predicate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TagExpr {
    Always,
    Atom(Tag),
    Not(Box<TagExpr>),
    And(Box<TagExpr>, Box<TagExpr>),
    Or(Box<TagExpr>, Box<TagExpr>),
}

impl TagExpr {
    /// Parse a tag predicate string. An empty (or all-whitespace) string
    /// parses to `Always` (see SPEC_FULL.md §3 for the resolved open question).
    pub fn parse(src: &str) -> CoreResult<TagExpr> {
        let mut pairs = TagExprParser::parse(Rule::program, src).map_err(|e| CoreError::TagParse {
            pos: pest_error_pos(&e),
            msg: e.to_string(),
        })?;
        let program = pairs.next().expect("program rule always produced");
        let mut inner = program.into_inner();
        match inner.next() {
            Some(pair) if pair.as_rule() == Rule::expr => Ok(build_expr(pair)),
            _ => Ok(TagExpr::Always),
        }
    }

    /// Evaluate this predicate against an active tag set.
    pub fn matches(&self, tags: &TagSet) -> bool {
        match self {
            TagExpr::Always => true,
            TagExpr::Atom(a) => tags.contains_literal(a),
            TagExpr::Not(e) => !e.matches(tags),
            TagExpr::And(l, r) => l.matches(tags) && r.matches(tags),
            TagExpr::Or(l, r) => l.matches(tags) || r.matches(tags),
        }
    }

    /// Rewrite to disjunctive normal form: an `Or` of `And`-chains of
    /// (possibly negated) atoms, with duplicate conjuncts elided.
    pub fn to_dnf(&self) -> TagExpr {
        let pushed = push_not(self.clone());
        let expanded = distribute(pushed);
        dedup_conjuncts(expanded)
    }

    /// Split a DNF expression into its disjuncts, each a standalone predicate.
    /// Used by the update planner, which wants per-condition expectations.
    pub fn split(&self) -> Vec<TagExpr> {
        fn collect_or(e: &TagExpr, out: &mut Vec<TagExpr>) {
            match e {
                TagExpr::Or(l, r) => {
                    collect_or(l, out);
                    collect_or(r, out);
                }
                other => out.push(other.clone()),
            }
        }
        let dnf = self.to_dnf();
        let mut out = Vec::new();
        collect_or(&dnf, &mut out);
        out
    }
}

impl fmt::Display for TagExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagExpr::Always => write!(f, "*"),
            TagExpr::Atom(a) => write!(f, "{a}"),
            TagExpr::Not(e) => write!(f, "!{e}"),
            TagExpr::And(l, r) => write!(f, "({l} & {r})"),
            TagExpr::Or(l, r) => write!(f, "({l} | {r})"),
        }
    }
}

fn pest_error_pos(e: &pest::error::Error<Rule>) -> usize {
    match e.location {
        pest::error::InputLocation::Pos(p) => p,
        pest::error::InputLocation::Span((s, _)) => s,
    }
}

fn build_expr(pair: Pair<Rule>) -> TagExpr {
    match pair.as_rule() {
        Rule::expr => build_expr(pair.into_inner().next().unwrap()),
        Rule::or_expr => {
            let mut inner = pair.into_inner();
            let mut acc = build_expr(inner.next().unwrap());
            for next in inner {
                acc = TagExpr::Or(Box::new(acc), Box::new(build_expr(next)));
            }
            acc
        }
        Rule::and_expr => {
            let mut inner = pair.into_inner();
            let mut acc = build_expr(inner.next().unwrap());
            for next in inner {
                acc = TagExpr::And(Box::new(acc), Box::new(build_expr(next)));
            }
            acc
        }
        Rule::not_expr => {
            let text = pair.as_str();
            let bangs = text.chars().filter(|c| *c == '!').count();
            let inner = pair.into_inner().next().unwrap();
            let mut e = build_expr(inner);
            for _ in 0..bangs {
                e = TagExpr::Not(Box::new(e));
            }
            e
        }
        Rule::primary => build_expr(pair.into_inner().next().unwrap()),
        Rule::atom => TagExpr::Atom(Tag::parse(pair.as_str())),
        other => unreachable!("unexpected rule in tag expression: {other:?}"),
    }
}

fn push_not(e: TagExpr) -> TagExpr {
    match e {
        TagExpr::Not(inner) => match *inner {
            TagExpr::Not(e2) => push_not(*e2),
            TagExpr::And(l, r) => push_not(TagExpr::Or(
                Box::new(TagExpr::Not(l)),
                Box::new(TagExpr::Not(r)),
            )),
            TagExpr::Or(l, r) => push_not(TagExpr::And(
                Box::new(TagExpr::Not(l)),
                Box::new(TagExpr::Not(r)),
            )),
            TagExpr::Always => TagExpr::Not(Box::new(TagExpr::Always)),
            atom @ TagExpr::Atom(_) => TagExpr::Not(Box::new(atom)),
        },
        TagExpr::And(l, r) => TagExpr::And(Box::new(push_not(*l)), Box::new(push_not(*r))),
        TagExpr::Or(l, r) => TagExpr::Or(Box::new(push_not(*l)), Box::new(push_not(*r))),
        other => other,
    }
}

fn distribute(e: TagExpr) -> TagExpr {
    match e {
        TagExpr::And(l, r) => {
            let l = distribute(*l);
            let r = distribute(*r);
            match (l, r) {
                (TagExpr::Or(a, b), r) => distribute(TagExpr::Or(
                    Box::new(TagExpr::And(a, Box::new(r.clone()))),
                    Box::new(TagExpr::And(b, Box::new(r))),
                )),
                (l, TagExpr::Or(a, b)) => distribute(TagExpr::Or(
                    Box::new(TagExpr::And(Box::new(l.clone()), a)),
                    Box::new(TagExpr::And(Box::new(l), b)),
                )),
                (l, r) => TagExpr::And(Box::new(l), Box::new(r)),
            }
        }
        TagExpr::Or(l, r) => TagExpr::Or(Box::new(distribute(*l)), Box::new(distribute(*r))),
        other => other,
    }
}

/// Literal in a conjunct: atom or negated atom, used for dedup ordering.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd)]
enum Literal {
    Pos(Tag),
    Neg(Tag),
    Always,
}

fn flatten_and(e: &TagExpr, out: &mut Vec<Literal>) {
    match e {
        TagExpr::And(l, r) => {
            flatten_and(l, out);
            flatten_and(r, out);
        }
        TagExpr::Atom(a) => out.push(Literal::Pos(a.clone())),
        TagExpr::Not(inner) => match inner.as_ref() {
            TagExpr::Atom(a) => out.push(Literal::Neg(a.clone())),
            TagExpr::Always => out.push(Literal::Always),
            _ => unreachable!("not pushed fully inward before dedup"),
        },
        TagExpr::Always => out.push(Literal::Always),
        TagExpr::Or(..) => unreachable!("distribute must remove nested Or under And"),
    }
}

fn literal_key(l: &Literal) -> (u8, String, String) {
    match l {
        Literal::Pos(t) => (0, t.name.clone(), t.value.clone().unwrap_or_default()),
        Literal::Neg(t) => (1, t.name.clone(), t.value.clone().unwrap_or_default()),
        Literal::Always => (2, String::new(), String::new()),
    }
}

fn rebuild_and(lits: Vec<Literal>) -> TagExpr {
    let mut it = lits.into_iter();
    let mut acc = match it.next() {
        Some(Literal::Pos(t)) => TagExpr::Atom(t),
        Some(Literal::Neg(t)) => TagExpr::Not(Box::new(TagExpr::Atom(t))),
        Some(Literal::Always) | None => TagExpr::Always,
    };
    for l in it {
        let e = match l {
            Literal::Pos(t) => TagExpr::Atom(t),
            Literal::Neg(t) => TagExpr::Not(Box::new(TagExpr::Atom(t))),
            Literal::Always => TagExpr::Always,
        };
        acc = TagExpr::And(Box::new(acc), Box::new(e));
    }
    acc
}

fn dedup_conjuncts(e: TagExpr) -> TagExpr {
    fn dedup_one(e: TagExpr) -> TagExpr {
        let mut lits = Vec::new();
        flatten_and(&e, &mut lits);
        let mut seen = BTreeSet::new();
        let mut uniq = Vec::new();
        for l in lits {
            let k = literal_key(&l);
            if seen.insert(k) {
                uniq.push(l);
            }
        }
        rebuild_and(uniq)
    }

    match e {
        TagExpr::Or(l, r) => TagExpr::Or(Box::new(dedup_conjuncts(*l)), Box::new(dedup_conjuncts(*r))),
        other => dedup_one(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_atom_and_matches() {
        let e = TagExpr::parse("linux").unwrap();
        let mut tags = TagSet::new();
        tags.insert("linux");
        assert!(e.matches(&tags));
        assert!(!e.matches(&TagSet::new()));
    }

    #[test]
    fn bare_name_matches_valued_tag() {
        let e = TagExpr::parse("kver_ge").unwrap();
        let mut tags = TagSet::new();
        tags.insert("kver_ge:3_10");
        assert!(e.matches(&tags));
    }

    #[test]
    fn precedence_and_parens() {
        let e = TagExpr::parse("linux & (kver_ge:3_10 | !experimental)").unwrap();
        let mut a = TagSet::new();
        a.insert("linux");
        assert!(e.matches(&a)); // no experimental tag -> !experimental true
        a.insert("experimental");
        assert!(!e.matches(&a));
        a.insert("kver_ge:3_10");
        assert!(e.matches(&a));
    }

    #[test]
    fn empty_expression_always_matches() {
        let e = TagExpr::parse("").unwrap();
        assert_eq!(e, TagExpr::Always);
        assert!(e.matches(&TagSet::new()));
    }

    #[test]
    fn dnf_idempotent() {
        let e = TagExpr::parse("!(a & b) | (c & !d)").unwrap();
        let once = e.to_dnf();
        let twice = once.to_dnf();
        assert_eq!(once, twice);
    }

    fn arb_tag_expr() -> impl proptest::strategy::Strategy<Value = TagExpr> {
        use proptest::prelude::*;
        let leaf = prop_oneof![
            Just(TagExpr::Always),
            "[a-d]".prop_map(|n| TagExpr::Atom(Tag { name: n, value: None })),
        ];
        leaf.prop_recursive(4, 64, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| TagExpr::Not(Box::new(e))),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| TagExpr::And(Box::new(l), Box::new(r))),
                (inner.clone(), inner).prop_map(|(l, r)| TagExpr::Or(Box::new(l), Box::new(r))),
            ]
        })
    }

    proptest::proptest! {
        #[test]
        fn dnf_idempotent_holds_for_arbitrary_expressions(e in arb_tag_expr()) {
            let once = e.to_dnf();
            let twice = once.to_dnf();
            proptest::prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn split_returns_disjuncts() {
        let e = TagExpr::parse("a | b | c").unwrap();
        let parts = e.split();
        assert_eq!(parts.len(), 3);
        let mut tags = TagSet::new();
        tags.insert("b");
        assert!(parts.iter().any(|p| p.matches(&tags)));
    }

    #[test]
    fn dedup_elides_duplicate_conjuncts() {
        let e = TagExpr::parse("a & a & b").unwrap().to_dnf();
        let mut lits = Vec::new();
        flatten_and(&e, &mut lits);
        assert_eq!(lits.len(), 2);
    }

    #[test]
    fn tag_set_later_value_supersedes_earlier() {
        let mut tags = TagSet::new();
        tags.insert("name:v1");
        tags.insert("name:v2");
        let e = TagExpr::parse("name:v2").unwrap();
        assert!(e.matches(&tags));
        let e_old = TagExpr::parse("name:v1").unwrap();
        assert!(!e_old.matches(&tags));
    }
}
