use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::fetch::PageSource;

static CITY_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.table.table-hover.table-bordered").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static PAGE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.page-link").unwrap());

const NEXT_LABEL: &str = "Next";

// City table layout, by cell position:
//
//   0  city number
//   1  city name
//   2  country
//   3  latitude
//   4  longitude
//
// A change in the listing site's columns only touches these constants.
const COL_NUMBER: usize = 0;
const COL_NAME: usize = 1;
const COL_COUNTRY: usize = 2;
const COL_LATITUDE: usize = 3;
const COL_LONGITUDE: usize = 4;
const COLUMN_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CityRecord {
    pub city_number: String,
    pub city_name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One parsed listing page: its cities plus the next page to follow, if any.
pub struct ListingPage {
    pub cities: Vec<CityRecord>,
    pub next: Option<String>,
}

/// Walk every listing page reachable from `base_url` via its "Next" links.
///
/// Pagination stops when a page has no "Next" link under `base_url`, or when
/// the link points back at a page already crawled in this call.
pub async fn crawl<P: PageSource>(pages: &P, base_url: &str) -> Result<Vec<CityRecord>> {
    info!("Crawling city listing {}", base_url);

    let mut cities = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(base_url.to_string());

    while let Some(url) = next.take() {
        if !visited.insert(url.clone()) {
            warn!("Next page {} was already crawled, stopping pagination", url);
            break;
        }
        let html = pages.fetch_page(&url).await?;
        let page = parse_listing(&html, &url, base_url)?;
        info!(url = %url, rows = page.cities.len(), "Scraped listing page");
        cities.extend(page.cities);
        next = page.next;
    }

    info!("Found {} cities on {} pages", cities.len(), visited.len());
    Ok(cities)
}

/// Parse one listing page fetched from `url`.
pub fn parse_listing(html: &str, url: &str, base_url: &str) -> Result<ListingPage, ParseError> {
    let document = Html::parse_document(html);
    let cities = extract_cities(&document, url)?;
    let next = next_page(&document, base_url);
    Ok(ListingPage { cities, next })
}

/// Extract one `CityRecord` per data row of the city table, in row order.
/// Rows without `td` cells (headers, spacers) are skipped.
pub fn extract_cities(document: &Html, url: &str) -> Result<Vec<CityRecord>, ParseError> {
    let table = document
        .select(&CITY_TABLE)
        .next()
        .ok_or_else(|| ParseError::MissingTable { url: url.to_string() })?;

    let mut cities = Vec::new();
    for (row_idx, row) in table.select(&ROW).enumerate() {
        let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() < COLUMN_COUNT {
            return Err(ParseError::MissingColumn {
                url: url.to_string(),
                row: row_idx,
                found: cells.len(),
                expected: COLUMN_COUNT,
            });
        }

        let coordinate = |col: usize, field: &'static str| {
            cells[col]
                .parse::<f64>()
                .map_err(|source| ParseError::Coordinate {
                    url: url.to_string(),
                    row: row_idx,
                    field,
                    text: cells[col].clone(),
                    source,
                })
        };

        cities.push(CityRecord {
            city_number: cells[COL_NUMBER].clone(),
            city_name: cells[COL_NAME].clone(),
            country: cells[COL_COUNTRY].clone(),
            latitude: coordinate(COL_LATITUDE, "latitude")?,
            longitude: coordinate(COL_LONGITUDE, "longitude")?,
        });
    }

    debug!("Extracted {} cities from {}", cities.len(), url);
    Ok(cities)
}

/// Find the "Next" pagination link whose href stays under `base_url`.
/// When several qualify, the last one on the page wins.
pub fn next_page(document: &Html, base_url: &str) -> Option<String> {
    let mut next = None;
    for link in document.select(&PAGE_LINK) {
        if link.text().collect::<String>() != NEXT_LABEL {
            continue;
        }
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        debug!("Next page link: {}", href);
        if href.starts_with(base_url) {
            next = Some(href.to_string());
        }
    }
    next
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const BASE: &str = "https://geokeo.com/database/city/de";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    struct FixturePages(HashMap<String, String>);

    impl FixturePages {
        fn new(pages: &[(&str, String)]) -> Self {
            FixturePages(
                pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.clone()))
                    .collect(),
            )
        }
    }

    impl PageSource for FixturePages {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {}", url))
        }
    }

    fn table(rows: &str) -> String {
        format!(
            "<html><body><table class=\"table table-hover table-bordered\">{}</table></body></html>",
            rows
        )
    }

    #[test]
    fn first_page_rows_in_order() {
        let doc = Html::parse_document(&fixture("cities_page1"));
        let cities = extract_cities(&doc, BASE).unwrap();
        assert_eq!(cities.len(), 4);
        let names: Vec<&str> = cities.iter().map(|c| c.city_name.as_str()).collect();
        assert_eq!(names, ["Aachen", "Augsburg", "Bergisch Gladbach", "Berlin"]);
        assert_eq!(cities[0].city_number, "1");
        assert_eq!(cities[0].country, "Germany");
        assert_eq!(cities[0].latitude, 50.776351);
        assert_eq!(cities[0].longitude, 6.083862);
        assert_eq!(cities[3].latitude, 52.517036);
    }

    #[test]
    fn header_and_empty_rows_skipped() {
        let html = table(
            "<tr><th>#</th><th>City</th></tr>\
             <tr></tr>\
             <tr><td>7</td><td> Bochum </td><td>Germany</td><td>51.481811</td><td>7.219664</td></tr>",
        );
        let cities = extract_cities(&Html::parse_document(&html), BASE).unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].city_name, "Bochum");
    }

    #[test]
    fn duplicate_rows_are_kept() {
        let row = "<tr><td>4</td><td>Berlin</td><td>Germany</td><td>52.517036</td><td>13.38886</td></tr>";
        let html = table(&format!("{row}{row}"));
        let cities = extract_cities(&Html::parse_document(&html), BASE).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0], cities[1]);
    }

    #[test]
    fn missing_table() {
        let html = "<html><body><table class=\"table\"><tr><td>1</td></tr></table></body></html>";
        let err = extract_cities(&Html::parse_document(html), BASE).unwrap_err();
        assert!(matches!(err, ParseError::MissingTable { .. }));
    }

    #[test]
    fn bad_coordinate() {
        let html = table("<tr><td>1</td><td>Aachen</td><td>Germany</td><td>north</td><td>6.08</td></tr>");
        let err = extract_cities(&Html::parse_document(&html), BASE).unwrap_err();
        match err {
            ParseError::Coordinate { field, text, .. } => {
                assert_eq!(field, "latitude");
                assert_eq!(text, "north");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_row() {
        let html = table("<tr><td>1</td><td>Aachen</td><td>Germany</td></tr>");
        let err = extract_cities(&Html::parse_document(&html), BASE).unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn { found: 3, .. }));
    }

    #[test]
    fn next_link_under_base() {
        let doc = Html::parse_document(&fixture("cities_page1"));
        assert_eq!(
            next_page(&doc, BASE).as_deref(),
            Some("https://geokeo.com/database/city/de/2/")
        );
    }

    #[test]
    fn next_link_outside_base_is_ignored() {
        let doc = Html::parse_document(&fixture("cities_page3"));
        assert_eq!(next_page(&doc, BASE), None);
    }

    #[test]
    fn last_matching_next_link_wins() {
        let html = format!(
            "{}<a class=\"page-link\" href=\"{BASE}/2/\">Next</a>\
             <a class=\"page-link\" href=\"{BASE}/5/\">Next</a>\
             <a class=\"page-link\" href=\"https://elsewhere.example/9/\">Next</a>\
             <a class=\"page-link\" href=\"{BASE}/7/\">Previous</a>",
            table("")
        );
        let doc = Html::parse_document(&html);
        assert_eq!(next_page(&doc, BASE), Some(format!("{BASE}/5/")));
    }

    #[test]
    fn next_label_must_match_exactly() {
        let html = format!(
            "{}<a class=\"page-link\" href=\"{BASE}/2/\">Next »</a>\
             <a class=\"page-link\">Next</a>\
             <a href=\"{BASE}/3/\">Next</a>",
            table("")
        );
        assert_eq!(next_page(&Html::parse_document(&html), BASE), None);
    }

    #[tokio::test]
    async fn crawl_follows_pages_until_exhausted() {
        let pages = FixturePages::new(&[
            (BASE, fixture("cities_page1")),
            ("https://geokeo.com/database/city/de/2/", fixture("cities_page2")),
            ("https://geokeo.com/database/city/de/3/", fixture("cities_page3")),
        ]);
        let cities = crawl(&pages, BASE).await.unwrap();
        assert_eq!(cities.len(), 12);
        let numbers: Vec<&str> = cities.iter().map(|c| c.city_number.as_str()).collect();
        let expected: Vec<String> = (1..=12).map(|n| n.to_string()).collect();
        assert_eq!(numbers, expected);
        assert_eq!(cities[4].city_name, "Berlin");
        assert_eq!(cities[11].city_name, "Darmstadt");
    }

    #[tokio::test]
    async fn crawl_single_page_without_next() {
        let html = table("<tr><td>1</td><td>Aachen</td><td>Germany</td><td>50.776351</td><td>6.083862</td></tr>");
        let pages = FixturePages::new(&[(BASE, html)]);
        let cities = crawl(&pages, BASE).await.unwrap();
        assert_eq!(cities.len(), 1);
    }

    #[tokio::test]
    async fn crawl_stops_on_self_link() {
        let html = format!(
            "{}<a class=\"page-link\" href=\"{BASE}\">Next</a>",
            table("<tr><td>1</td><td>Aachen</td><td>Germany</td><td>50.776351</td><td>6.083862</td></tr>")
        );
        let pages = FixturePages::new(&[(BASE, html)]);
        let cities = crawl(&pages, BASE).await.unwrap();
        assert_eq!(cities.len(), 1);
    }

    #[tokio::test]
    async fn crawl_propagates_fetch_failure() {
        let pages = FixturePages::new(&[(BASE, fixture("cities_page1"))]);
        assert!(crawl(&pages, BASE).await.is_err());
    }

    #[tokio::test]
    async fn crawl_propagates_parse_failure() {
        let pages = FixturePages::new(&[(BASE, "<html><body>maintenance</body></html>".to_string())]);
        let err = crawl(&pages, BASE).await.unwrap_err();
        assert!(err.downcast_ref::<ParseError>().is_some());
    }
}
