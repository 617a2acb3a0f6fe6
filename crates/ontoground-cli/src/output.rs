//! Human-readable and JSON rendering of command results.

use anyhow::Result;
use colored::Colorize;
use ontoground_grounding::{ExtractionResult, GroundingResult, OntologyCatalog, RankedOntology};
use serde::Serialize;
use std::fmt::Write as _;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn render_grounding(result: &GroundingResult) -> String {
    let mut out = String::new();
    match &result.ontology_used {
        Some(ontology) => {
            let _ = writeln!(
                out,
                "{} {} in {}",
                "grounded".green().bold(),
                result.term.bold(),
                ontology.cyan()
            );
            if let Some(matched) = result
                .matched_term
                .as_deref()
                .filter(|m| *m != result.term)
            {
                let _ = writeln!(out, "  via related term {}", matched.italic());
            }
            for hit in &result.matches {
                let _ = writeln!(out, "  {}  {}", hit.concept_id.bold(), hit.label);
            }
        }
        None => {
            let _ = writeln!(out, "{} {}", "no grounding".yellow().bold(), result.term.bold());
        }
    }
    out
}

pub(crate) fn render_ranking(term: &str, ranked: &[RankedOntology]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Ranked ontologies for".green().bold(), term.bold());
    for r in ranked {
        let _ = write!(out, "  {:>2}. {}", r.rank + 1, r.descriptor.id.cyan());
        match &r.rationale {
            Some(why) => {
                let _ = writeln!(out, " - {why}");
            }
            None => {
                let _ = writeln!(out, " {}", "(catalog order)".dimmed());
            }
        }
    }
    out
}

pub(crate) fn render_catalog(catalog: &OntologyCatalog) -> String {
    let width = catalog.all().iter().map(|d| d.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for d in catalog.all() {
        let _ = writeln!(
            out,
            "{}  {}  {}",
            format!("{:<width$}", d.id).cyan(),
            d.title,
            d.scope_hint.dimmed()
        );
    }
    out
}

pub(crate) fn render_extraction(result: &ExtractionResult) -> String {
    let mut out = String::new();
    if result.entities.is_empty() {
        let _ = writeln!(out, "{}", "no entities found".yellow());
    }
    for entity in &result.entities {
        let _ = write!(out, "{} {}: ", entity.class_name.bold(), entity.mention);
        match entity.grounding.matches.first() {
            Some(hit) => {
                let _ = writeln!(out, "{} ({})", hit.concept_id.green(), hit.label);
            }
            None => {
                let _ = writeln!(out, "{}", "ungrounded".yellow());
            }
        }
    }
    for warning in &result.warnings {
        let _ = writeln!(out, "{} {warning}", "warning:".yellow().bold());
    }
    out
}
