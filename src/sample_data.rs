use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const RECORDS_PER_TABLE: usize = 3;

/// Chart payload in the shape the frontend chart component consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChartData {
    pub(crate) labels: Vec<String>,
    pub(crate) data: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubstituteData {
    pub(crate) rows: Vec<Value>,
    pub(crate) chart: ChartData,
}

/// Deterministic stand-in rows served when the backend is unreachable, so the
/// UI can render tables and charts instead of an error page. Shapes mirror
/// the Chinook schema the live backend serves.
pub(crate) fn substitute_dataset(tables: &[String]) -> SubstituteData {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut data = Vec::new();

    for table in tables {
        let table_rows = rows_for_table(table);
        if table_rows.is_empty() {
            continue;
        }
        labels.push(table.clone());
        data.push(table_rows.len() as u64);
        rows.extend(table_rows);
    }

    SubstituteData {
        rows,
        chart: ChartData { labels, data },
    }
}

fn rows_for_table(table: &str) -> Vec<Value> {
    match table {
        "albums" => vec![
            json!({"_table": "albums", "AlbumId": 1, "Title": "For Those About To Rock We Salute You", "ArtistId": 1}),
            json!({"_table": "albums", "AlbumId": 2, "Title": "Balls to the Wall", "ArtistId": 2}),
            json!({"_table": "albums", "AlbumId": 3, "Title": "Restless and Wild", "ArtistId": 2}),
        ],
        "artists" => vec![
            json!({"_table": "artists", "ArtistId": 1, "Name": "AC/DC"}),
            json!({"_table": "artists", "ArtistId": 2, "Name": "Accept"}),
            json!({"_table": "artists", "ArtistId": 3, "Name": "Aerosmith"}),
        ],
        "tracks" => vec![
            json!({"_table": "tracks", "TrackId": 1, "Name": "For Those About To Rock (We Salute You)", "AlbumId": 1, "Milliseconds": 343_719, "UnitPrice": 0.99}),
            json!({"_table": "tracks", "TrackId": 2, "Name": "Balls to the Wall", "AlbumId": 2, "Milliseconds": 342_562, "UnitPrice": 0.99}),
            json!({"_table": "tracks", "TrackId": 3, "Name": "Fast As a Shark", "AlbumId": 3, "Milliseconds": 230_619, "UnitPrice": 0.99}),
        ],
        "customers" => vec![
            json!({"_table": "customers", "CustomerId": 1, "FirstName": "Luís", "LastName": "Gonçalves", "Country": "Brazil", "Email": "luisg@embraer.com.br"}),
            json!({"_table": "customers", "CustomerId": 2, "FirstName": "Leonie", "LastName": "Köhler", "Country": "Germany", "Email": "leonekohler@surfeu.de"}),
            json!({"_table": "customers", "CustomerId": 3, "FirstName": "François", "LastName": "Tremblay", "Country": "Canada", "Email": "ftremblay@gmail.com"}),
        ],
        "invoices" => vec![
            json!({"_table": "invoices", "InvoiceId": 1, "CustomerId": 2, "InvoiceDate": "2021-01-01", "BillingCountry": "Germany", "Total": 1.98}),
            json!({"_table": "invoices", "InvoiceId": 2, "CustomerId": 4, "InvoiceDate": "2021-01-02", "BillingCountry": "Norway", "Total": 3.96}),
            json!({"_table": "invoices", "InvoiceId": 3, "CustomerId": 8, "InvoiceDate": "2021-01-03", "BillingCountry": "Belgium", "Total": 5.94}),
        ],
        _ => Vec::new(),
    }
}
