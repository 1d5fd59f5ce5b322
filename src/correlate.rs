//! Page correlation for whole-document analysis results.

use crate::ocr::unstructured::PageElement;

/// Elements recorded on `page` (1-based), in their original order.
/// Elements without a page number never match.
pub fn elements_for_page(elements: &[PageElement], page: u32) -> Vec<&PageElement> {
    elements.iter().filter(|e| e.page == Some(page)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(page: Option<u32>, text: &str) -> PageElement {
        PageElement {
            category: "NarrativeText".to_string(),
            text: text.to_string(),
            page,
            polygon: None,
            layout: None,
        }
    }

    #[test]
    fn test_selects_single_matching_page() {
        let elements = vec![
            element(Some(1), "a"),
            element(Some(1), "b"),
            element(Some(2), "c"),
            element(Some(3), "d"),
        ];
        let page2 = elements_for_page(&elements, 2);
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].text, "c");
    }

    #[test]
    fn test_order_preserved_and_count_matches() {
        let elements = vec![
            element(Some(2), "x"),
            element(None, "orphan"),
            element(Some(1), "y"),
            element(Some(2), "z"),
        ];
        for page in 1..=3 {
            let selected = elements_for_page(&elements, page);
            let expected = elements.iter().filter(|e| e.page == Some(page)).count();
            assert_eq!(selected.len(), expected);
            assert!(selected.iter().all(|e| e.page == Some(page)));
        }
        let texts: Vec<&str> = elements_for_page(&elements, 2)
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["x", "z"]);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let elements = vec![element(Some(1), "a")];
        assert!(elements_for_page(&elements, 4).is_empty());
        assert!(elements_for_page(&[], 1).is_empty());
    }
}
