use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.limit()
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, 100)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub has_more: bool,
}

impl<T: Serialize> Paginated<T> {
    /// `items` may hold one extra row fetched to detect a following page.
    pub fn new(mut items: Vec<T>, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        let has_more = items.len() as u64 > per_page;
        items.truncate(per_page as usize);
        Self {
            items,
            page: params.page.max(1),
            per_page,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_zero_behaves_like_first_page() {
        let params = PaginationParams { page: 0, per_page: 10 };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn extra_row_marks_more_pages() {
        let params = PaginationParams { page: 2, per_page: 2 };
        let page = Paginated::new(vec![1, 2, 3], &params);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(params.offset(), 2);
    }
}
