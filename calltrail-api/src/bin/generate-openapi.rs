//! OpenAPI Specification Generator Binary
//!
//! Prints the CallTrail OpenAPI document as JSON to stdout.
//!
//! Usage:
//!   cargo run -p calltrail-api --bin generate-openapi > openapi.json

use calltrail_api::ApiDoc;

fn main() {
    match ApiDoc::to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI spec: {}", e);
            std::process::exit(1);
        }
    }
}
