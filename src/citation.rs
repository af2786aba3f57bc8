//! Citation strings for the "copy citation" action.

use std::str::FromStr;

use crate::apis::PaperRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitationStyle {
    /// `Authors (Year). Title. Venue.`
    #[default]
    Plain,
    /// APA 7th edition, approximately.
    Apa,
    Bibtex,
}

impl FromStr for CitationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "" => Ok(Self::Plain),
            "apa" => Ok(Self::Apa),
            "bibtex" | "bib" => Ok(Self::Bibtex),
            other => Err(format!("Unknown citation style '{}': expected plain, apa or bibtex", other)),
        }
    }
}

pub fn format_citation(paper: &PaperRecord, style: CitationStyle) -> String {
    match style {
        CitationStyle::Plain => format_plain(paper),
        CitationStyle::Apa => format_apa(paper),
        CitationStyle::Bibtex => format_bibtex(paper),
    }
}

fn year_or_nd(paper: &PaperRecord) -> String {
    paper.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string())
}

fn format_plain(paper: &PaperRecord) -> String {
    let authors = if paper.authors.is_empty() {
        "Unknown Author".to_string()
    } else {
        paper.authors.join(", ")
    };
    let mut citation = format!("{} ({}). {}.", authors, year_or_nd(paper), paper.title);
    if let Some(venue) = &paper.venue {
        citation.push_str(&format!(" {}.", venue));
    }
    citation
}

/// "First Middle Last" becomes "Last, F. M."
fn apa_name(author: &str) -> String {
    let words: Vec<&str> = author.split_whitespace().collect();
    match words.split_last() {
        Some((last, given)) if !given.is_empty() => {
            let initials: Vec<String> = given.iter()
                .filter_map(|w| w.chars().next())
                .map(|c| format!("{}.", c))
                .collect();
            format!("{}, {}", last, initials.join(" "))
        }
        _ => author.to_string(),
    }
}

fn format_apa(paper: &PaperRecord) -> String {
    let names: Vec<String> = paper.authors.iter().map(|a| apa_name(a)).collect();
    let authors = match names.as_slice() {
        [] => "Anonymous".to_string(),
        [one] => one.clone(),
        [rest @ .., last] => format!("{}, & {}", rest.join(", "), last),
    };
    let mut citation = format!("{} ({}). {}.", authors, year_or_nd(paper), paper.title);
    if let Some(venue) = &paper.venue {
        citation.push_str(&format!(" {}.", venue));
    }
    if let Some(link) = paper.link() {
        citation.push_str(&format!(" {}", link));
    }
    citation
}

fn bibtex_key(paper: &PaperRecord) -> String {
    let surname = paper.authors.first()
        .and_then(|a| a.split_whitespace().last())
        .unwrap_or("anon");
    let word = paper.title.split_whitespace()
        .find(|w| w.chars().any(char::is_alphanumeric))
        .unwrap_or("paper");
    let clean = |s: &str| -> String {
        s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_lowercase()
    };
    format!(
        "{}{}{}",
        clean(surname),
        paper.year.map(|y| y.to_string()).unwrap_or_default(),
        clean(word)
    )
}

fn format_bibtex(paper: &PaperRecord) -> String {
    let kind = if paper.venue.is_some() { "article" } else { "misc" };
    let mut fields = vec![format!("  title = {{{}}}", paper.title)];
    if !paper.authors.is_empty() {
        fields.push(format!("  author = {{{}}}", paper.authors.join(" and ")));
    }
    if let Some(year) = paper.year {
        fields.push(format!("  year = {{{}}}", year));
    }
    if let Some(venue) = &paper.venue {
        fields.push(format!("  journal = {{{}}}", venue));
    }
    if let Some(doi) = &paper.doi {
        fields.push(format!("  doi = {{{}}}", doi));
    }
    if let Some(url) = paper.link() {
        fields.push(format!("  url = {{{}}}", url));
    }
    format!("@{}{{{},\n{}\n}}", kind, bibtex_key(paper), fields.join(",\n"))
}
