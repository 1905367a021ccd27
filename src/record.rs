use serde::{Deserialize, Serialize};

use crate::COVER_URL_BASE;

/// Csv header, in the order the fields of [`Record`] are serialized.
pub const HEADERS: [&str; 10] = [
    "isbn13",
    "title",
    "author",
    "description",
    "nyt_list_category",
    "first_seen_date",
    "cover_url",
    "publisher",
    "rank",
    "weeks_on_list",
];

/// One book of the library, created the first time its ISBN shows up on a list.
/// Field order is the column order of the csv store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub isbn13: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub nyt_list_category: String,
    pub first_seen_date: String,
    pub cover_url: String,
    pub publisher: String,
    pub rank: Option<u32>,
    pub weeks_on_list: u32,
}

/// Open Library cover for an ISBN.
#[inline]
pub fn cover_url(isbn: &str) -> String {
    format!("{COVER_URL_BASE}/{isbn}-L.jpg")
}

/// Upper-cases the first letter of every run of letters and lower-cases the rest,
/// so `"THE WOMEN"` becomes `"The Women"` and `"o'brien"` becomes `"O'Brien"`.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_word = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}
