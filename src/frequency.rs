//! Counting of city occurences in the input CSV file

use crate::{add_nz_u64, CityCount, CityName, Result};
use anyhow::Context;
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use std::{
    cmp::Reverse,
    collections::{hash_map, HashMap},
    path::Path,
};
use tokio::{fs::File, io::AsyncRead};

/// Number of occurences of each city name
///
/// Names are compared exactly: no case or accent folding takes place, so
/// "Jundiaí" and "Jundiai" are two different cities.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FrequencyTable(HashMap<CityName, CityCount>);
//
impl FrequencyTable {
    /// Start with no city
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for the fields of one data row
    ///
    /// The last field of each row is not a city name and is ignored.
    pub fn add_row(&mut self, fields: &[&str]) {
        if let Some((_excluded, cities)) = fields.split_last() {
            for city in cities {
                self.add_city(city);
            }
        }
    }

    /// Account for one occurence of a city, ignoring blank names
    pub fn add_city(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        match self.0.get_mut(name) {
            Some(count) => *count = add_nz_u64(*count, CityCount::MIN),
            None => {
                self.0.insert(name.into(), CityCount::MIN);
            }
        }
    }

    /// Number of occurences of a city, if it was seen at all
    pub fn get(&self, name: &str) -> Option<CityCount> {
        self.0.get(name).copied()
    }

    /// Number of distinct cities
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Truth that no city was seen
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of occurences across all cities
    pub fn total(&self) -> u64 {
        self.0.values().map(|count| count.get()).sum()
    }

    /// Cities in order of decreasing count, then in lexicographic order
    pub fn by_decreasing_count(&self) -> Vec<(&str, CityCount)> {
        let mut cities = (self.0.iter())
            .map(|(name, count)| (&**name, *count))
            .collect::<Vec<_>>();
        cities.sort_unstable_by_key(|&(name, count)| (Reverse(count), name));
        cities
    }

    /// The `n` most frequent cities, most frequent first
    pub fn most_common(&self, n: usize) -> Vec<(&str, CityCount)> {
        let mut cities = self.by_decreasing_count();
        cities.truncate(n);
        cities
    }
}
//
impl FromIterator<(CityName, CityCount)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (CityName, CityCount)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, count) in iter {
            match table.0.entry(name) {
                hash_map::Entry::Occupied(o) => {
                    let o = o.into_mut();
                    *o = add_nz_u64(*o, count);
                }
                hash_map::Entry::Vacant(v) => {
                    v.insert(count);
                }
            }
        }
        table
    }
}

/// Count the cities listed in a CSV file
pub async fn load(path: &Path) -> Result<FrequencyTable> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening input file {}", path.display()))?;
    let table = count_cities(file)
        .await
        .with_context(|| format!("reading cities from {}", path.display()))?;
    log::info!(
        "Found {} occurences of {} distinct cities in {}",
        table.total(),
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Count the cities listed in CSV data
///
/// The first row is a header and is skipped. Rows may have differing lengths.
pub async fn count_cities(input: impl AsyncRead + Unpin + Send) -> Result<FrequencyTable> {
    let mut records = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .create_reader(input)
        .into_records();
    let mut table = FrequencyTable::new();
    let mut row = 1;
    while let Some(record) = records.next().await {
        row += 1;
        let record = record.with_context(|| format!("parsing CSV row {row}"))?;
        let fields = record.iter().collect::<Vec<_>>();
        log::trace!("Counting cities from row {row}: {fields:?}");
        table.add_row(&fields);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(n: u64) -> CityCount {
        CityCount::new(n).unwrap()
    }

    #[tokio::test]
    async fn last_column_and_blanks_are_ignored() {
        let csv = "A,B,C,D,E,Exclude\nSantos,,Santos,Campinas,,ignored\n";
        let table = count_cities(csv.as_bytes()).await.unwrap();
        let expected = [("Santos".into(), count(2)), ("Campinas".into(), count(1))]
            .into_iter()
            .collect::<FrequencyTable>();
        assert_eq!(table, expected);
        assert_eq!(table.get("ignored"), None);
    }

    #[tokio::test]
    async fn total_matches_non_blank_fields() {
        let csv = "\
Cidade,Vizinha,Outras
  Sorocaba , Itu,Jundiaí
Itu,   ,
Jundiaí,Sorocaba,Campinas
,,
only
";
        let table = count_cities(csv.as_bytes()).await.unwrap();
        // Non-blank fields outside of the last column
        assert_eq!(table.total(), 5);
        assert_eq!(table.get("Sorocaba"), Some(count(2)));
        assert_eq!(table.get("Itu"), Some(count(2)));
        assert_eq!(table.get("Jundiaí"), Some(count(1)));
        assert_eq!(table.get("Campinas"), None);
        assert_eq!(table.get("only"), None);
    }

    #[tokio::test]
    async fn header_only_input_is_empty() {
        let table = count_cities("A,B,Exclude\n".as_bytes()).await.unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn names_are_compared_exactly() {
        let mut table = FrequencyTable::new();
        for name in ["Jundiaí", "Jundiai", "jundiaí", " Jundiaí "] {
            table.add_city(name);
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("Jundiaí"), Some(count(2)));
    }

    #[test]
    fn most_common_orders_by_count_then_name() {
        let table = [
            ("Santos".into(), count(8)),
            ("Campinas".into(), count(3)),
            ("Jundiaí".into(), count(3)),
            ("Itu".into(), count(1)),
        ]
        .into_iter()
        .collect::<FrequencyTable>();
        assert_eq!(
            table.most_common(3),
            vec![
                ("Santos", count(8)),
                ("Campinas", count(3)),
                ("Jundiaí", count(3)),
            ]
        );
        assert_eq!(table.by_decreasing_count().len(), 4);
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        assert!(load(Path::new("no/such/cities.csv")).await.is_err());
    }
}
