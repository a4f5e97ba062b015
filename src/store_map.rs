use serde::Serialize;

/// One aisle on the store map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AisleView<'a> {
    pub name: &'a str,
    pub highlighted: bool,
}

/// Lay out the configured aisles, marking the one matching `highlight`.
///
/// Matching ignores surrounding whitespace and ASCII case, so a product's
/// `aisle` cell of `"aisle 3 "` still highlights `Aisle 3`. An empty
/// highlight marks nothing.
pub fn aisle_layout<'a>(aisles: &'a [String], highlight: &str) -> Vec<AisleView<'a>> {
    let highlight = highlight.trim();
    aisles
        .iter()
        .map(|aisle| AisleView {
            name: aisle.as_str(),
            highlighted: !highlight.is_empty() && aisle.trim().eq_ignore_ascii_case(highlight),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aisles() -> Vec<String> {
        ["Aisle 1", "Aisle 3", "Freezer"]
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    #[test]
    fn highlights_matching_aisle_only() {
        let aisles = aisles();
        let layout = aisle_layout(&aisles, " aisle 3 ");

        let lit: Vec<&str> = layout
            .iter()
            .filter(|a| a.highlighted)
            .map(|a| a.name)
            .collect();
        assert_eq!(lit, vec!["Aisle 3"]);
    }

    #[test]
    fn empty_highlight_marks_nothing() {
        let aisles = aisles();
        assert!(aisle_layout(&aisles, "").iter().all(|a| !a.highlighted));
        assert_eq!(aisle_layout(&aisles, "").len(), 3);
    }
}
