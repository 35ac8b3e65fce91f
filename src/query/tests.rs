//! Tests for the query parser, evaluator and executor

use super::*;
use crate::error::FilterError;
use crate::index::{Indices, LinkIndex, RecordLookup, RecordStore};
use crate::model::{Episode, Record, RelationEdge, StaffAssignment, SubjectType};
use std::collections::BTreeMap;

fn cond(line: &str) -> Condition {
    match parse(line) {
        Ok(c) => c,
        Err(e) => panic!("failed to parse `{}`: {}", line, e),
    }
}

fn edge(source: u64, target: u64, code: u32, ordinal: u32) -> RelationEdge {
    RelationEdge { source, target, code, ordinal }
}

fn book(id: u64) -> Record {
    Record::new(id, SubjectType::Book)
}

fn relations(edges: Vec<RelationEdge>) -> Indices {
    Indices::new().with_relations(edges.into_iter().collect())
}

fn evaluate(condition: &Condition, record: &Record, indices: &Indices, store: Option<&RecordStore>) -> Outcome {
    let evaluator = Evaluator::new(indices, store.map(|s| s as &dyn RecordLookup), EvalOptions::default());
    evaluator.evaluate(condition, record)
}

fn matches(line: &str, record: &Record) -> bool {
    evaluate(&cond(line), record, &Indices::new(), None).matched
}

/// Book 1 with two 单行本: record 2 (2020-01-01) and record 3 (2021-01-01)
fn volumes() -> (RecordStore, Indices) {
    let store: RecordStore = vec![
        book(1).field_value("出版社", "角川").field_value("册数", "2"),
        book(2).field_value("出版社", "角川").field_value("发售日", "2020-01-01"),
        book(3).field_value("出版社", "讲谈社").field_value("发售日", "2021-01-01"),
    ]
    .into_iter()
    .collect();
    let indices = relations(vec![edge(1, 2, 1003, 1), edge(1, 3, 1003, 2)]);
    (store, indices)
}

// ============================================================================
// Parser
// ============================================================================

mod parser_tests {
    use super::*;

    #[test]
    fn test_field_contains() {
        assert_eq!(
            cond("出版社:角川"),
            Condition::Field(FieldCond::new("出版社", Matcher::Contains(Template::literal("角川"))))
        );
    }

    #[test]
    fn test_negated_field() {
        let Condition::Field(f) = cond("作者:!某人") else { panic!("expected field condition") };
        assert!(f.negated);
        assert_eq!(f.matcher, Matcher::Contains(Template::literal("某人")));
    }

    #[test]
    fn test_empty_value() {
        let Condition::Field(f) = cond("别名:") else { panic!("expected field condition") };
        assert_eq!(f.matcher, Matcher::Empty);
        assert!(!f.negated);

        let Condition::Field(f) = cond("别名:!") else { panic!("expected field condition") };
        assert_eq!(f.matcher, Matcher::Empty);
        assert!(f.negated);
    }

    #[test]
    fn test_colon_inside_reference_not_split() {
        let Condition::Field(f) = cond("册数:等于:{{count:单行本}}") else { panic!("expected field condition") };
        assert_eq!(f.subject, Subject::Field("册数".to_string()));
        assert_eq!(
            f.matcher,
            Matcher::Equals(Template::new(vec![Segment::Count(CountRef::Relation("单行本".to_string()))]))
        );
    }

    #[test]
    fn test_count_subject() {
        let Condition::Field(f) = cond("{{count:单行本}}:大于:0") else { panic!("expected field condition") };
        assert_eq!(f.subject, Subject::Count(CountRef::Relation("单行本".to_string())));
        assert_eq!(f.matcher, Matcher::Compare(Comparison::Greater, Template::literal("0")));
    }

    #[test]
    fn test_count_references() {
        let Condition::Field(f) = cond("{{count:staff:作者}}:等于:{{count:ep}}") else {
            panic!("expected field condition")
        };
        assert_eq!(f.subject, Subject::Count(CountRef::Staff("作者".to_string())));
        assert_eq!(f.matcher, Matcher::Equals(Template::new(vec![Segment::Count(CountRef::Episodes)])));
    }

    #[test]
    fn test_unknown_count_reference() {
        assert!(parse("册数:等于:{{count:不存在}}").is_err());
        assert!(parse("册数:等于:{{count:staff:不存在}}").is_err());
    }

    #[test]
    fn test_self_reference_is_equality() {
        let Condition::Field(f) = cond("name_cn:{{name}}") else { panic!("expected field condition") };
        assert_eq!(f.matcher, Matcher::Equals(Template::new(vec![Segment::Field("name".to_string())])));
    }

    #[test]
    fn test_embedded_reference_is_contains() {
        let Condition::Field(f) = cond("summary:《{{name}}》") else { panic!("expected field condition") };
        assert_eq!(
            f.matcher,
            Matcher::Contains(Template::new(vec![
                Segment::Text("《".to_string()),
                Segment::Field("name".to_string()),
                Segment::Text("》".to_string()),
            ]))
        );
    }

    #[test]
    fn test_regex_compiled_at_parse() {
        let Condition::Field(f) = cond("name:re:^魔法") else { panic!("expected field condition") };
        let Matcher::Regex(pattern) = f.matcher else { panic!("expected regex") };
        assert!(matches!(pattern.compiled, Some(Ok(_))));
    }

    #[test]
    fn test_invalid_regex_still_parses() {
        let Condition::Field(f) = cond("name:re:(") else { panic!("expected field condition") };
        let Matcher::Regex(pattern) = f.matcher else { panic!("expected regex") };
        assert!(matches!(pattern.compiled, Some(Err(_))));
    }

    #[test]
    fn test_comparisons() {
        let Condition::Field(f) = cond("发售日:晚于:2020年6月") else { panic!("expected field condition") };
        assert_eq!(f.matcher, Matcher::Compare(Comparison::After, Template::literal("2020年6月")));

        let Condition::Field(f) = cond("页数:lt:300") else { panic!("expected field condition") };
        assert_eq!(f.matcher, Matcher::Compare(Comparison::Less, Template::literal("300")));
    }

    #[test]
    fn test_invalid_comparison_operand() {
        assert!(parse("页数:大于:很多").is_err());
        assert!(parse("发售日:早于:去年").is_err());
    }

    #[test]
    fn test_bare_relation() {
        let Condition::Relation(r) = cond("单行本:发售日:晚于:2020-06-01") else { panic!("expected relation") };
        assert_eq!(r.name, "单行本");
        assert_eq!(r.link.mode, MatchMode::Any);
        assert!(!r.link.negated);
        assert_eq!(r.link.nested.len(), 1);
        assert_eq!(r.link.nested[0].subject, Subject::Field("发售日".to_string()));
    }

    #[test]
    fn test_relation_all_mode() {
        let Condition::Relation(r) = cond("relation:单行本:all:出版社:角川") else { panic!("expected relation") };
        assert_eq!(r.link.mode, MatchMode::All);
        assert_eq!(r.link.nested.len(), 1);

        let Condition::Relation(r) = cond("单行本:all:出版社:角川") else { panic!("expected relation") };
        assert_eq!(r.link.mode, MatchMode::All);
    }

    #[test]
    fn test_relation_existence() {
        let Condition::Relation(r) = cond("relation:单行本") else { panic!("expected relation") };
        assert!(r.link.is_bare());
        assert!(!r.link.negated);

        let Condition::Relation(r) = cond("relation:!单行本") else { panic!("expected relation") };
        assert!(r.link.is_bare());
        assert!(r.link.negated);
    }

    #[test]
    fn test_relation_name_alone() {
        let Condition::Relation(r) = cond("单行本") else { panic!("expected relation") };
        assert_eq!(r.name, "单行本");
        assert!(r.link.is_bare());
    }

    #[test]
    fn test_relation_name_with_single_value_is_field() {
        // one colon after a relation name is not enough for the bare form
        assert!(matches!(cond("出版社:角川"), Condition::Field(_)));
        assert!(matches!(cond("续集:有"), Condition::Field(_)));
    }

    #[test]
    fn test_negated_relation_rejects_nested() {
        assert!(parse("relation:!单行本:出版社:角川").is_err());
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(parse("relation:不存在").is_err());
        assert!(parse("staff:不存在").is_err());
        assert!(parse("type:漫画").is_err());
    }

    #[test]
    fn test_staff_forms() {
        let Condition::Staff(s) = cond("staff:作者") else { panic!("expected staff") };
        assert_eq!(s.position, "作者");
        assert!(s.link.is_bare());

        let Condition::Staff(s) = cond("staff:!插图") else { panic!("expected staff") };
        assert!(s.link.negated);

        let Condition::Staff(s) = cond("staff:作者:count:大于:1") else { panic!("expected staff") };
        assert!(s.link.nested.is_empty());
        assert_eq!(s.link.count_checks.len(), 1);
        assert_eq!(
            s.link.count_checks[0].matcher,
            Matcher::Compare(Comparison::Greater, Template::literal("1"))
        );
    }

    #[test]
    fn test_episode_forms() {
        let Condition::Episode(e) = cond("ep") else { panic!("expected episode") };
        assert!(e.link.is_bare() && !e.link.negated);

        let Condition::Episode(e) = cond("ep:!") else { panic!("expected episode") };
        assert!(e.link.negated);

        let Condition::Episode(e) = cond("ep:all:airdate:晚于:2020") else { panic!("expected episode") };
        assert_eq!(e.link.mode, MatchMode::All);
        assert_eq!(e.link.nested.len(), 1);

        let Condition::Episode(e) = cond("ep:name:第一话") else { panic!("expected episode") };
        assert_eq!(e.link.mode, MatchMode::Any);
        assert_eq!(e.link.nested.len(), 1);
    }

    #[test]
    fn test_tags() {
        assert_eq!(
            cond("tag:轻小说"),
            Condition::Tag(TagCond { kind: TagKind::Tag, name: "轻小说".to_string(), negated: false })
        );
        assert_eq!(
            cond("meta_tag:!漫画"),
            Condition::Tag(TagCond { kind: TagKind::MetaTag, name: "漫画".to_string(), negated: true })
        );
        assert!(parse("tag:").is_err());
    }

    #[test]
    fn test_type_forms_agree() {
        let expected = cond("type:1");
        assert_eq!(cond("type:书籍"), expected);
        assert_eq!(cond("书籍"), expected);
        assert_eq!(cond("book"), expected);
    }

    #[test]
    fn test_cross_reference_only_nested() {
        assert!(parse("出版社:{{{出版社}}}").is_err());
        assert!(parse("*:{{{出版社}}}").is_err());
        let Condition::Relation(r) = cond("单行本:出版社:{{{出版社}}}") else { panic!("expected relation") };
        assert!(r.link.nested[0].has_source());
    }

    #[test]
    fn test_unterminated_reference() {
        let err = parse("册数:等于:{{count:单行本").unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert!(parse("name:{{{name}}").is_err());
    }

    #[test]
    fn test_wildcard_collects_references() {
        let Condition::Wildcard(w) = cond("*:{{name}}") else { panic!("expected wildcard") };
        assert_eq!(w.referenced, vec!["name".to_string()]);
        assert!(!w.negated);
    }

    #[test]
    fn test_nested_wildcard_rejected() {
        assert!(parse("单行本:*:角川").is_err());
    }

    #[test]
    fn test_malformed_line() {
        let err = parse("随便写点什么").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.text, "随便写点什么");
    }
}

mod query_tests {
    use super::*;

    #[test]
    fn test_comments_and_blank_lines() {
        let parsed = parse_query("# publisher\n\n出版社:角川\n   \n# type\n书籍\n");
        assert!(parsed.is_clean());
        assert_eq!(parsed.query.len(), 2);
    }

    #[test]
    fn test_bad_line_dropped_rest_kept() {
        let parsed = parse_query("出版社:角川\nrelation:不存在\n页数:大于:100");
        assert_eq!(parsed.query.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 2);
        assert_eq!(parsed.errors[0].text, "relation:不存在");
    }

    #[test]
    fn test_block_form() {
        let parsed = parse_query("单行本:all {\n    发售日:晚于:2020-06-01\n    出版社:{{{出版社}}}\n}\n");
        assert!(parsed.is_clean(), "{:?}", parsed.errors);
        let Condition::Relation(r) = &parsed.query.conditions()[0] else { panic!("expected relation") };
        assert_eq!(r.link.mode, MatchMode::All);
        assert_eq!(r.link.nested.len(), 2);
    }

    #[test]
    fn test_prefixed_block_headers() {
        let parsed = parse_query("relation:单行本 {\n出版社:角川\n}\nstaff:作者 {\ncount:大于:1\n}\nep:all {\nairdate:晚于:2020\n}");
        assert!(parsed.is_clean(), "{:?}", parsed.errors);
        assert_eq!(parsed.query.len(), 3);
        assert!(matches!(parsed.query.conditions()[1], Condition::Staff(_)));
        assert!(matches!(parsed.query.conditions()[2], Condition::Episode(_)));
    }

    #[test]
    fn test_block_with_bad_line_is_dropped() {
        let parsed = parse_query("单行本 {\n出版社:角川\n*:x\n}\n书籍");
        assert_eq!(parsed.query.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 3);
    }

    #[test]
    fn test_unclosed_block() {
        let parsed = parse_query("单行本 {\n出版社:角川\n");
        assert!(parsed.query.is_empty());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 1);
    }

    #[test]
    fn test_unclosed_block_keeps_header_error() {
        let parsed = parse_query("relation:单行本:出版社:角川 {\n出版社:角川\n");
        assert!(parsed.query.is_empty());
        assert_eq!(parsed.errors.len(), 2);
        assert!(parsed.errors[0].message.contains("inline condition"));
        assert!(parsed.errors[1].message.contains("not closed"));
    }

    #[test]
    fn test_relation_named_head_with_colon_value() {
        let Condition::Relation(r) = cond("其他:re:a:b") else { panic!("expected relation") };
        assert_eq!(r.name, "其他");
        assert!(matches!(cond("其他:re:a"), Condition::Field(_)));
    }

    #[test]
    fn test_requirements() {
        let parsed = parse_query("出版社:角川\nstaff:作者\n册数:等于:{{count:单行本}}");
        let req = parsed.query.requirements();
        assert!(req.relations && req.staff);
        assert!(!req.episodes && !req.record_lookup);

        let parsed = parse_query("单行本:发售日:晚于:2020");
        assert!(parsed.query.requirements().record_lookup);
    }

    #[test]
    fn test_columns_in_query_order() {
        let parsed = parse_query("出版社:角川\nname:re:魔法\n册数:等于:{{count:单行本}}\nstaff:作者\ntag:轻小说");
        let columns = parsed.query.columns();
        assert_eq!(columns.fields, vec!["出版社", "name", "册数"]);
        assert_eq!(columns.counts, vec!["单行本"]);
        assert_eq!(columns.staff, vec!["作者"]);
        assert!(columns.tags && !columns.meta_tags);
    }
}

// ============================================================================
// Negation
// ============================================================================

mod negate_tests {
    use super::*;

    #[test]
    fn test_negate_toggles() {
        let c = cond("出版社:角川");
        let n = c.negate().unwrap();
        assert_ne!(c, n);
        assert_eq!(n.negate().unwrap(), c);
    }

    #[test]
    fn test_negate_undefined_cases() {
        assert!(cond("册数:等于:{{count:单行本}}").negate().is_none());
        assert!(cond("单行本:出版社:角川").negate().is_none());
        assert!(cond("staff:作者:count:大于:1").negate().is_none());
        assert!(cond("relation:单行本").negate().is_some());
        assert!(cond("ep:!").negate().is_some());
    }

    #[test]
    fn test_negation_is_complement() {
        let records = vec![
            book(1).field_value("出版社", "角川").field_value("页数", "320"),
            book(2).field_value("出版社", "讲谈社"),
            book(3),
            book(4).field_value("出版社", "").tag("轻小说"),
        ];
        let lines = [
            "出版社:角川",
            "出版社:",
            "出版社:re:^讲",
            "出版社:等于:角川",
            "页数:大于:300",
            "作者:某人",
            "*:角川",
            "tag:轻小说",
            "type:书籍",
        ];
        for line in lines {
            let c = cond(line);
            let n = c.negate().unwrap();
            for record in &records {
                assert_ne!(
                    matches_condition(&c, record),
                    matches_condition(&n, record),
                    "`{}` on record {}",
                    line,
                    record.id()
                );
            }
        }
    }

    #[test]
    fn test_link_negation_is_complement() {
        let (store, indices) = volumes();
        for line in ["relation:单行本", "relation:续集"] {
            let c = cond(line);
            let n = c.negate().unwrap();
            for record in store.iter() {
                let a = evaluate(&c, record, &indices, Some(&store)).matched;
                let b = evaluate(&n, record, &indices, Some(&store)).matched;
                assert_ne!(a, b, "`{}` on record {}", line, record.id());
            }
        }
    }

    fn matches_condition(c: &Condition, record: &Record) -> bool {
        evaluate(c, record, &Indices::new(), None).matched
    }
}

// ============================================================================
// Field evaluation
// ============================================================================

mod field_eval_tests {
    use super::*;

    #[test]
    fn test_publisher_scenario() {
        let record = book(1).field_value("出版社", "角川");
        assert!(matches("出版社:角川", &record));
        assert!(!matches("出版社:讲谈社", &record));
    }

    #[test]
    fn test_absent_field() {
        let record = book(1);
        assert!(!matches("作者:某人", &record));
        assert!(matches("作者:!某人", &record));
        assert!(matches("作者:", &record));
        assert!(!matches("作者:re:.*", &record));
    }

    #[test]
    fn test_annex_lookup() {
        let record = book(1).annex("{{Infobox animanga/Novel\n|作者= 某人\n|ISBN= 978-4-04\n}}");
        assert!(matches("作者:某人", &record));
        assert!(matches("isbn:978", &record));
    }

    #[test]
    fn test_equals_trims() {
        let record = book(1).field_value("册数", " 2 ");
        assert!(matches("册数:等于:2", &record));
        assert!(!matches("册数:等于:20", &record));
    }

    #[test]
    fn test_regex() {
        let record = book(1).field_value("name", "魔法少女");
        assert!(matches("name:re:^魔法", &record));
        assert!(!matches("name:re:^少女", &record));
    }

    #[test]
    fn test_regex_fallback_counted() {
        let record = book(1).field_value("name", "(株)");
        let outcome = evaluate(&cond("name:re:("), &record, &Indices::new(), None);
        assert!(outcome.matched);
        assert_eq!(outcome.warnings.regex_fallbacks, 1);
    }

    #[test]
    fn test_numeric_and_date_comparisons() {
        let record = book(1).field_value("页数", "320页").field_value("发售日", "2019年7月12日");
        assert!(matches("页数:大于:300", &record));
        assert!(!matches("页数:小于:300", &record));
        assert!(matches("发售日:早于:2020-01-01", &record));
        assert!(!matches("发售日:晚于:2020", &record));
        assert!(!matches("定价:大于:0", &record));
    }

    #[test]
    fn test_self_reference_is_reflexive() {
        let record = book(7)
            .field_value("name", "某作品")
            .field_value("出版社", "角川")
            .annex("{{Infobox\n|发售日= 2020-01-01\n}}");
        for (name, _) in record.all_fields() {
            let line = format!("{}:{{{{{}}}}}", name, name);
            assert!(matches(&line, &record), "`{}`", line);
        }
    }

    #[test]
    fn test_self_reference_between_fields() {
        let same = book(1).field_value("name", "Fate").field_value("name_cn", "Fate");
        let different = book(2).field_value("name", "Fate").field_value("name_cn", "命运");
        assert!(matches("name_cn:{{name}}", &same));
        assert!(!matches("name_cn:{{name}}", &different));
    }

    #[test]
    fn test_missing_reference_counted() {
        let record = book(1).field_value("name", "Fate");
        let outcome = evaluate(&cond("name:{{name_cn}}"), &record, &Indices::new(), None);
        assert!(!outcome.matched);
        assert_eq!(outcome.warnings.missing_references, 1);
    }

    #[test]
    fn test_captures_field_and_references() {
        let record = book(1).field_value("name", "Fate").field_value("name_cn", "Fate");
        let outcome = evaluate(&cond("name_cn:{{name}}"), &record, &Indices::new(), None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.fields.get("name_cn").map(String::as_str), Some("Fate"));
        assert_eq!(outcome.capture.fields.get("name").map(String::as_str), Some("Fate"));
    }

    #[test]
    fn test_type_condition() {
        assert!(matches("书籍", &book(1)));
        assert!(!matches("动画", &book(1)));
        assert!(matches("type:!动画", &book(1)));
    }
}

mod wildcard_tests {
    use super::*;

    #[test]
    fn test_wildcard_searches_both_tiers() {
        let record = book(1).field_value("name", "某作品").annex("{{Infobox\n|出版社= 角川书店\n}}");
        assert!(matches("*:角川", &record));
        assert!(!matches("*:讲谈社", &record));
        assert!(matches("*:!讲谈社", &record));
    }

    #[test]
    fn test_wildcard_captures_hit() {
        let record = book(1).field_value("出版社", "角川");
        let outcome = evaluate(&cond("*:角川"), &record, &Indices::new(), None);
        assert_eq!(outcome.capture.fields.get("出版社").map(String::as_str), Some("角川"));
    }
}

mod tag_tests {
    use super::*;

    #[test]
    fn test_tags_and_meta_tags() {
        let record = book(1).tag("轻小说").meta_tag("小说");
        assert!(matches("tag:轻小说", &record));
        assert!(!matches("tag:漫画", &record));
        assert!(matches("tag:!漫画", &record));
        assert!(matches("meta_tag:小说", &record));
        assert!(!matches("meta_tag:轻小说", &record));
    }

    #[test]
    fn test_tag_capture() {
        let record = book(1).tag("轻小说");
        let outcome = evaluate(&cond("tag:轻小说"), &record, &Indices::new(), None);
        assert_eq!(outcome.capture.tags, vec!["轻小说".to_string()]);
    }
}

// ============================================================================
// Relations
// ============================================================================

mod relation_eval_tests {
    use super::*;

    #[test]
    fn test_any_and_all_scenario() {
        let (store, indices) = volumes();
        let record = store.get(1).unwrap();

        let any = evaluate(&cond("单行本:发售日:晚于:2020-06-01"), record, &indices, Some(&store));
        assert!(any.matched);
        assert_eq!(any.capture.relations.get("单行本"), Some(&vec![3]));

        let all = evaluate(&cond("单行本:all:发售日:晚于:2020-06-01"), record, &indices, Some(&store));
        assert!(!all.matched);
    }

    #[test]
    fn test_all_over_zero_entities_fails() {
        let (store, indices) = volumes();
        let lonely = store.get(2).unwrap();
        assert!(!evaluate(&cond("单行本:all:发售日:晚于:2000"), lonely, &indices, Some(&store)).matched);
        assert!(!evaluate(&cond("单行本:发售日:晚于:2000"), lonely, &indices, Some(&store)).matched);
    }

    #[test]
    fn test_all_satisfied() {
        let (store, indices) = volumes();
        let record = store.get(1).unwrap();
        let outcome = evaluate(&cond("单行本:all:发售日:晚于:2019"), record, &indices, Some(&store));
        assert!(outcome.matched);
        assert_eq!(outcome.capture.relations.get("单行本"), Some(&vec![2, 3]));
    }

    #[test]
    fn test_exhaustive_capture() {
        let (store, indices) = volumes();
        let record = store.get(1).unwrap();
        let c = cond("单行本:发售日:晚于:2000");

        let short = evaluate(&c, record, &indices, Some(&store));
        assert_eq!(short.capture.relations.get("单行本"), Some(&vec![2]));

        let evaluator = Evaluator::new(&indices, Some(&store), EvalOptions { exhaustive: true });
        let full = evaluator.evaluate(&c, record);
        assert_eq!(full.capture.relations.get("单行本"), Some(&vec![2, 3]));
    }

    #[test]
    fn test_existence_captures_all_targets() {
        let (store, indices) = volumes();
        let outcome = evaluate(&cond("relation:单行本"), store.get(1).unwrap(), &indices, None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.relations.get("单行本"), Some(&vec![2, 3]));
    }

    #[test]
    fn test_type_scoping() {
        let anime = Record::new(10, SubjectType::Anime);
        let indices = relations(vec![edge(10, 11, 1003, 0)]);

        let outcome = evaluate(&cond("relation:单行本"), &anime, &indices, None);
        assert!(!outcome.matched);
        assert_eq!(outcome.warnings.unresolved_names, 1);
        assert!(evaluate(&cond("relation:!单行本"), &anime, &indices, None).matched);
    }

    #[test]
    fn test_same_name_resolves_per_type() {
        let indices = relations(vec![edge(1, 2, 1006, 0), edge(10, 11, 3, 0)]);
        let c = cond("relation:续集");
        assert!(evaluate(&c, &book(1), &indices, None).matched);
        assert!(evaluate(&c, &Record::new(10, SubjectType::Anime), &indices, None).matched);
        // code 3 means nothing for a book
        let indices = relations(vec![edge(1, 2, 3, 0)]);
        assert!(!evaluate(&c, &book(1), &indices, None).matched);
    }

    #[test]
    fn test_count_and_negated_relation_exclusive() {
        let indices = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1003, 1)]);
        let negated = cond("relation:!单行本");
        let counted = cond("{{count:单行本}}:大于:0");
        let records = [book(1), book(2), Record::new(10, SubjectType::Anime)];
        for record in &records {
            let a = evaluate(&negated, record, &indices, None).matched;
            let b = evaluate(&counted, record, &indices, None).matched;
            assert_ne!(a, b, "record {}", record.id());
        }
    }

    #[test]
    fn test_volume_count_scenario() {
        let record = book(1).field_value("册数", "2");
        let c = cond("册数:等于:{{count:单行本}}");

        let two = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1003, 1)]);
        let outcome = evaluate(&c, &record, &two, None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.counts.get("单行本"), Some(&2));

        let three = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1003, 1), edge(1, 4, 1003, 2)]);
        assert!(!evaluate(&c, &record, &three, None).matched);
    }

    #[test]
    fn test_counts_ignore_other_codes() {
        let record = book(1).field_value("册数", "1");
        let indices = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1006, 0)]);
        assert!(evaluate(&cond("册数:等于:{{count:单行本}}"), &record, &indices, None).matched);
    }

    #[test]
    fn test_cross_reference_block() {
        let (store, indices) = volumes();
        let record = store.get(1).unwrap();

        let all = parse_query("单行本:all {\n出版社:{{{出版社}}}\n}");
        let outcome = evaluate(&all.query.conditions()[0], record, &indices, Some(&store));
        assert!(!outcome.matched);

        let any = parse_query("单行本 {\n出版社:{{{出版社}}}\n}");
        let outcome = evaluate(&any.query.conditions()[0], record, &indices, Some(&store));
        assert!(outcome.matched);
        assert_eq!(outcome.capture.relations.get("单行本"), Some(&vec![2]));
    }

    #[test]
    fn test_relation_count_check() {
        let (store, indices) = volumes();
        let record = store.get(1).unwrap();
        let outcome = evaluate(&cond("单行本:count:等于:2"), record, &indices, Some(&store));
        assert!(outcome.matched);
        let parsed = parse_query("单行本 {\n出版社:角川\ncount:等于:1\n}");
        assert!(evaluate(&parsed.query.conditions()[0], record, &indices, Some(&store)).matched);
    }

    #[test]
    fn test_missing_target_is_blank() {
        let store: RecordStore = vec![book(1), book(2).field_value("发售日", "2020-01-01")].into_iter().collect();
        let indices = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1003, 1)]);
        let record = store.get(1).unwrap();

        let outcome = evaluate(&cond("单行本:all:发售日:早于:2030"), record, &indices, Some(&store));
        assert!(!outcome.matched);
        assert_eq!(outcome.warnings.missing_targets, 1);

        let outcome = evaluate(&cond("单行本:发售日:!2021"), record, &indices, Some(&store));
        assert!(outcome.matched);
    }

    #[test]
    fn test_missing_target_counts_nothing() {
        let store: RecordStore = vec![book(1), book(2)].into_iter().collect();
        let indices = relations(vec![edge(1, 2, 1003, 0), edge(1, 3, 1003, 1)]);
        let record = store.get(1).unwrap();

        let outcome = evaluate(&cond("单行本:all:{{count:单行本}}:等于:0"), record, &indices, Some(&store));
        assert!(outcome.matched);
        assert_eq!(outcome.warnings.missing_targets, 1);
        assert_eq!(outcome.warnings.missing_references, 1);
        assert!(outcome.capture.counts.is_empty());
    }
}

// ============================================================================
// Staff and episodes
// ============================================================================

mod staff_eval_tests {
    use super::*;

    fn staff() -> Indices {
        let assignments: LinkIndex<StaffAssignment> = vec![
            StaffAssignment { subject: 1, position: 2001, person: 100, extra: BTreeMap::new() },
            StaffAssignment {
                subject: 1,
                position: 2001,
                person: 101,
                extra: BTreeMap::from([("appear_eps".to_string(), "1-12".to_string())]),
            },
            StaffAssignment { subject: 10, position: 2, person: 200, extra: BTreeMap::new() },
        ]
        .into_iter()
        .collect();
        Indices::new().with_staff(assignments)
    }

    #[test]
    fn test_position_presence() {
        let indices = staff();
        let outcome = evaluate(&cond("staff:作者"), &book(1), &indices, None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.staff.get("作者"), Some(&vec![100, 101]));
        assert!(evaluate(&cond("staff:!插图"), &book(1), &indices, None).matched);
        assert!(!evaluate(&cond("staff:!作者"), &book(1), &indices, None).matched);
    }

    #[test]
    fn test_positions_are_type_scoped() {
        let indices = staff();
        let anime = Record::new(10, SubjectType::Anime);
        assert!(evaluate(&cond("staff:导演"), &anime, &indices, None).matched);
        assert!(!evaluate(&cond("staff:作者"), &anime, &indices, None).matched);
    }

    #[test]
    fn test_count_checks() {
        let indices = staff();
        assert!(evaluate(&cond("staff:作者:count:大于:1"), &book(1), &indices, None).matched);
        assert!(!evaluate(&cond("staff:作者:count:大于:2"), &book(1), &indices, None).matched);
        assert!(evaluate(&cond("{{count:staff:作者}}:等于:2"), &book(1), &indices, None).matched);
    }

    #[test]
    fn test_nested_assignment_fields() {
        let indices = staff();
        let outcome = evaluate(&cond("staff:作者:appear_eps:1-12"), &book(1), &indices, None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.staff.get("作者"), Some(&vec![101]));
    }
}

mod episode_eval_tests {
    use super::*;

    fn episodes() -> Indices {
        let episode = |id: u64, airdate: &str| Episode {
            subject: 1,
            id,
            extra: BTreeMap::from([("airdate".to_string(), airdate.to_string())]),
        };
        let index: LinkIndex<Episode> = vec![episode(10, "2021-01-01"), episode(11, "2019-05-01")].into_iter().collect();
        Indices::new().with_episodes(index)
    }

    #[test]
    fn test_episode_presence() {
        let indices = episodes();
        assert!(evaluate(&cond("ep"), &book(1), &indices, None).matched);
        assert!(!evaluate(&cond("ep:!"), &book(1), &indices, None).matched);
        assert!(evaluate(&cond("ep:!"), &book(2), &indices, None).matched);
    }

    #[test]
    fn test_episode_quantifiers() {
        let indices = episodes();
        let outcome = evaluate(&cond("ep:airdate:晚于:2020"), &book(1), &indices, None);
        assert!(outcome.matched);
        assert_eq!(outcome.capture.episodes, vec![10]);
        assert!(!evaluate(&cond("ep:all:airdate:晚于:2020"), &book(1), &indices, None).matched);
    }

    #[test]
    fn test_episode_count() {
        let indices = episodes();
        assert!(evaluate(&cond("{{count:ep}}:等于:2"), &book(1), &indices, None).matched);
        assert!(evaluate(&cond("ep:count:等于:2"), &book(1), &indices, None).matched);
    }
}

// ============================================================================
// Executor
// ============================================================================

mod executor_tests {
    use super::*;

    fn store() -> RecordStore {
        vec![
            book(1).field_value("出版社", "角川"),
            book(2).field_value("出版社", "讲谈社"),
            book(3).field_value("出版社", "角川文库"),
            Record::new(4, SubjectType::Anime).field_value("出版社", "角川"),
        ]
        .into_iter()
        .collect()
    }

    fn query(text: &str) -> Query {
        let parsed = parse_query(text);
        assert!(parsed.is_clean(), "{:?}", parsed.errors);
        parsed.query
    }

    #[test]
    fn test_empty_query_rejected() {
        let q = Query::default();
        let indices = Indices::new();
        let result = Executor::new(&q, &indices, None, EvalOptions::default());
        assert!(matches!(result, Err(FilterError::EmptyQuery)));
    }

    #[test]
    fn test_missing_index_is_fatal() {
        let indices = Indices::new();
        for (text, index) in [
            ("relation:单行本", "relations"),
            ("册数:等于:{{count:单行本}}", "relations"),
            ("staff:作者", "staff"),
            ("ep", "episodes"),
        ] {
            let q = query(text);
            let result = Executor::new(&q, &indices, None, EvalOptions::default());
            assert!(matches!(result, Err(FilterError::MissingIndex(name)) if name == index), "{}", text);
        }
    }

    #[test]
    fn test_record_store_required_for_nested_relations() {
        let (store, indices) = volumes();
        let q = query("单行本:发售日:晚于:2020");
        assert!(matches!(
            Executor::new(&q, &indices, None, EvalOptions::default()),
            Err(FilterError::RecordStoreRequired)
        ));
        assert!(Executor::new(&q, &indices, Some(&store), EvalOptions::default()).is_ok());

        let bare = query("relation:单行本");
        assert!(Executor::new(&bare, &indices, None, EvalOptions::default()).is_ok());
    }

    #[test]
    fn test_run_preserves_order() {
        let store = store();
        let indices = Indices::new();
        let q = query("出版社:角川\n书籍");
        let executor = Executor::new(&q, &indices, Some(&store), EvalOptions::default()).unwrap();

        let mut run = executor.run(store.iter());
        let ids: Vec<u64> = run.by_ref().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let stats = run.stats();
        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn test_run_accepts_owned_records() {
        let indices = Indices::new();
        let q = query("出版社:讲谈社");
        let executor = Executor::new(&q, &indices, None, EvalOptions::default()).unwrap();
        let ids: Vec<u64> = executor.run(store().records().to_vec()).map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (store, indices) = volumes();
        let q = query("单行本:发售日:晚于:2020-06-01\n出版社:角川");
        let executor = Executor::new(&q, &indices, Some(&store), EvalOptions::default()).unwrap();

        let sequential: Vec<ResultEntry> = executor.run(store.iter()).collect();
        let (parallel, stats) = executor.run_parallel(store.records());
        assert_eq!(sequential, parallel);
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_result_entry() {
        let (store, indices) = volumes();
        let q = query("出版社:角川\n册数:等于:{{count:单行本}}");
        let executor = Executor::new(&q, &indices, Some(&store), EvalOptions::default()).unwrap();
        let (entry, warnings) = executor.evaluate_record(store.get(1).unwrap());
        let entry = entry.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(entry.url, "https://bgm.tv/subject/1");
        assert_eq!(entry.capture.counts.get("单行本"), Some(&2));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["type"], 1);
        assert_eq!(json["fields"]["出版社"], "角川");
        assert_eq!(json["counts"]["单行本"], 2);
    }

    #[test]
    fn test_warnings_aggregated() {
        let store = store();
        let indices = Indices::new();
        let q = query("name:re:(");
        let executor = Executor::new(&q, &indices, None, EvalOptions::default()).unwrap();
        let mut run = executor.run(&store);
        assert_eq!(run.by_ref().count(), 0);
        // every record lacks `name`, so the pattern is never consulted
        assert_eq!(run.stats().warnings.regex_fallbacks, 0);

        let named: Vec<Record> = vec![book(1).field_value("name", "a"), book(2).field_value("name", "b")];
        let mut run = executor.run(&named);
        assert_eq!(run.by_ref().count(), 0);
        assert_eq!(run.stats().warnings.regex_fallbacks, 2);
    }
}
