use std::env;

use ontoground_schema::{SchemaAnnotationResolver, SchemaFragment};

fn main() {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: ontoground_check_schema <schema.yaml>");
        std::process::exit(2);
    };
    if args.next().is_some() {
        eprintln!("usage: ontoground_check_schema <schema.yaml>");
        std::process::exit(2);
    }

    let schema = match SchemaFragment::from_path(&path) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let resolved = SchemaAnnotationResolver::new().resolve(&schema);
    println!(
        "ok(schema): classes={} rules={} warnings={}",
        schema.classes.len(),
        resolved.rules.len(),
        resolved.warnings.len()
    );
    for rule in &resolved.rules {
        println!("  {} -> {}", rule.id_prefix, rule.preferred_ontology_id);
    }
    for warning in &resolved.warnings {
        eprintln!("warning: {warning}");
    }
}
