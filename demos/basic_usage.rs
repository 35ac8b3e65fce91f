//! Basic usage example for bangumi-filter
//!
//! Run: cargo run --example basic_usage

use bangumi_filter::{
    parse_query, EvalOptions, Executor, Indices, LinkIndex, Record, RecordStore, RelationEdge, SubjectType,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== bangumi-filter - Basic Usage ===\n");

    println!("1. Building a small archive...");
    let store: RecordStore = vec![
        Record::new(1, SubjectType::Book)
            .field_value("name", "某系列")
            .field_value("册数", "2")
            .annex("{{Infobox animanga/Novel\n|出版社= 角川\n}}")
            .tag("轻小说"),
        Record::new(2, SubjectType::Book)
            .field_value("name", "某系列 (1)")
            .annex("{{Infobox animanga/Book\n|出版社= 角川\n|发售日= 2020-01-01\n}}"),
        Record::new(3, SubjectType::Book)
            .field_value("name", "某系列 (2)")
            .annex("{{Infobox animanga/Book\n|出版社= 角川\n|发售日= 2021-01-01\n}}"),
        Record::new(4, SubjectType::Anime).field_value("name", "某动画"),
    ]
    .into_iter()
    .collect();

    let relations: LinkIndex<RelationEdge> = vec![
        RelationEdge { source: 1, target: 2, code: 1003, ordinal: 1 },
        RelationEdge { source: 1, target: 3, code: 1003, ordinal: 2 },
    ]
    .into_iter()
    .collect();
    let indices = Indices::new().with_relations(relations);
    println!("   {} subjects, {} relation edges\n", store.len(), 2);

    println!("2. Parsing a query...");
    let text = "\
# series published by 角川 whose volume count matches the 册数 field
书籍
出版社:角川
册数:等于:{{count:单行本}}
单行本:all {
    出版社:{{{出版社}}}
}
relation:不存在
";
    let parsed = parse_query(text);
    for error in &parsed.errors {
        println!("   dropped: {}", error);
    }
    println!("   {} conditions\n", parsed.query.len());

    println!("3. Running...");
    let options = EvalOptions { exhaustive: true };
    let executor = Executor::new(&parsed.query, &indices, Some(&store), options)?;
    let mut run = executor.run(&store);
    for entry in run.by_ref() {
        println!("   {} {}", entry.id, entry.url);
        println!("   {}", serde_json::to_string(&entry.capture)?);
    }
    let stats = run.stats();
    println!("\n   matched {} of {} subjects", stats.matched, stats.scanned);

    Ok(())
}
