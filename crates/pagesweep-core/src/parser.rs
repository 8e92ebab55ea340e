//! Page parsing: raw payload to ordered records.
//!
//! The engine only depends on [`PageParser`]; any `Fn(&str) -> Vec<Record>`
//! works. [`TableParser`] reads HTML listing tables with configurable selectors.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::config::ParserConfig;
use crate::record::Record;

/// Turns one page payload into its records, in document order. Never fails:
/// malformed rows are dropped, and an empty result means "no records here".
pub trait PageParser: Send + Sync {
    fn parse(&self, payload: &str) -> Vec<Record>;
}

impl<F> PageParser for F
where
    F: Fn(&str) -> Vec<Record> + Send + Sync,
{
    fn parse(&self, payload: &str) -> Vec<Record> {
        self(payload)
    }
}

#[derive(Debug, Error)]
#[error("invalid {field} selector {selector:?}: {reason}")]
pub struct SelectorError {
    pub field: &'static str,
    pub selector: String,
    pub reason: String,
}

/// HTML table parser: one record per matched row.
#[derive(Debug)]
pub struct TableParser {
    row: Selector,
    ordinal: Selector,
    date: Selector,
    image: Selector,
    name: Selector,
    link: Selector,
    document: Selector,
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl TableParser {
    pub fn new(cfg: &ParserConfig) -> Result<Self, SelectorError> {
        Ok(Self {
            row: compile("row", &cfg.row)?,
            ordinal: compile("ordinal", &cfg.ordinal)?,
            date: compile("date", &cfg.date)?,
            image: compile("image", &cfg.image)?,
            name: compile("name", &cfg.name)?,
            link: compile("link", &cfg.link)?,
            document: compile("document", &cfg.document)?,
        })
    }

    fn parse_row(&self, row: &ElementRef) -> Record {
        Record {
            ordinal: text(row, &self.ordinal),
            date: text(row, &self.date),
            image: attr(row, &self.image, "src"),
            name: text(row, &self.name),
            link: attr(row, &self.link, "href"),
            document: attr(row, &self.document, "href"),
        }
    }
}

impl PageParser for TableParser {
    fn parse(&self, payload: &str) -> Vec<Record> {
        let document = Html::parse_document(payload);
        document
            .select(&self.row)
            .map(|row| self.parse_row(&row))
            .filter(Record::is_valid)
            .collect()
    }
}

fn text(row: &ElementRef, selector: &Selector) -> String {
    row.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn attr(row: &ElementRef, selector: &Selector, name: &str) -> Option<String> {
    row.select(selector)
        .next()
        .and_then(|el| el.value().attr(name))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <div class="table-benhvien"><table><tbody>
            <tr>
                <td class="text-center"> 1 </td>
                <td><span class="date">01/02/2024</span></td>
                <td><img src="/logo/a.png"></td>
                <td><h3 class="name"> Bệnh viện A </h3></td>
                <td><a class="website" href="https://a.example">site</a></td>
                <td><a class="product-datasets__label" href="/qd/a.pdf">QĐ</a></td>
            </tr>
            <tr>
                <td class="text-center">2</td>
                <td><span class="date">03/04/2024</span></td>
                <td></td>
                <td><h3 class="name">Bệnh viện B</h3></td>
                <td></td>
                <td></td>
            </tr>
            <tr>
                <td class="text-center">3</td>
                <td><h3 class="name">   </h3></td>
            </tr>
        </tbody></table></div>
        </body></html>
    "#;

    #[test]
    fn parses_rows_and_drops_nameless() {
        let parser = TableParser::new(&ParserConfig::default()).unwrap();
        let records = parser.parse(PAGE);
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.ordinal, "1");
        assert_eq!(a.date, "01/02/2024");
        assert_eq!(a.image.as_deref(), Some("/logo/a.png"));
        assert_eq!(a.name, "Bệnh viện A");
        assert_eq!(a.link.as_deref(), Some("https://a.example"));
        assert_eq!(a.document.as_deref(), Some("/qd/a.pdf"));

        let b = &records[1];
        assert_eq!(b.name, "Bệnh viện B");
        assert!(b.image.is_none());
        assert!(b.link.is_none());
        assert!(b.document.is_none());
    }

    #[test]
    fn page_without_table_is_empty() {
        let parser = TableParser::new(&ParserConfig::default()).unwrap();
        assert!(parser.parse("<html><body><p>Không có dữ liệu</p></body></html>").is_empty());
        assert!(parser.parse("").is_empty());
    }

    #[test]
    fn invalid_selector_is_reported() {
        let cfg = ParserConfig {
            row: "tr[".to_string(),
            ..ParserConfig::default()
        };
        let err = TableParser::new(&cfg).unwrap_err();
        assert_eq!(err.field, "row");
    }

    #[test]
    fn closures_are_parsers() {
        let parser = |payload: &str| {
            payload
                .lines()
                .map(|l| Record {
                    name: l.to_string(),
                    ..Record::default()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(PageParser::parse(&parser, "a\nb").len(), 2);
    }
}
