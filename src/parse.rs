use crate::record::{cover_url, title_case, Record};
use crate::request::Page;
use crate::store::IdentifierCache;

/// Pulls every book not yet in `seen` out of `page`, marking it as seen.
/// Books without an ISBN are skipped, so reprocessing a page yields nothing new.
pub fn extract_records(page: &Page, seen: &mut IdentifierCache) -> Vec<Record> {
    let first_seen_date = page.current_date().unwrap_or_default();

    // A weekly overview carries roughly 15 books per list.
    let mut records = Vec::with_capacity(page.lists.len() * 15);
    for category in &page.lists {
        let list_name = category.list_name.as_deref().unwrap_or_default();
        for book in &category.books {
            let Some(isbn) = book.primary_isbn13.as_deref().filter(|i| !i.is_empty()) else {
                continue;
            };
            if !seen.insert(isbn) {
                continue;
            }

            records.push(Record {
                isbn13: isbn.to_string(),
                title: title_case(book.title.as_deref().unwrap_or_default()),
                author: book.author.clone().unwrap_or_default(),
                description: book.description.clone().unwrap_or_default(),
                nyt_list_category: list_name.to_string(),
                first_seen_date: first_seen_date.to_string(),
                cover_url: cover_url(isbn),
                publisher: book.publisher.clone().unwrap_or_default(),
                rank: book.rank,
                weeks_on_list: book.weeks_on_list.unwrap_or(0),
            });
        }
    }
    records
}
