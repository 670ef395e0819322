#[cfg(test)]
mod tests {
    use crate::filter_state::{
        CategoryFilter, FilterChange, FilterState, SortDirection, SortKey, SourceFilter,
        StatusFilter, AMOUNT_UNBOUNDED_SENTINEL, DEFAULT_PAGE_SIZE,
    };
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_any_filter_change_resets_page() {
        let changes = vec![
            FilterChange::default().query("ambiente"),
            FilterChange::default().source(SourceFilter::Europa),
            FilterChange::default().category(CategoryFilter::Cultura),
            FilterChange::default().status(StatusFilter::Active),
            FilterChange::default().amount_range(1000, Some(50_000)),
            FilterChange::default().deadline_range(Some(date("2026-09-01")), None),
            FilterChange::default().sort(SortKey::Amount, SortDirection::Desc),
            FilterChange::default().page_size(50),
        ];

        for change in changes {
            let mut state = FilterState::default();
            state.update(FilterChange::default().page(7));
            assert_eq!(state.page, 7);

            state.update(change.clone());
            assert_eq!(state.page, 1, "page not reset by {:?}", change);
        }
    }

    #[test]
    fn test_page_only_change_keeps_page() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().page(3));
        assert_eq!(state.page, 3);

        // Page zero coerces to the first page
        state.update(FilterChange::default().page(0));
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_filter_change_with_page_still_resets() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().query("sport").page(4));
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_signature_ignores_mutation_order() {
        let mut a = FilterState::default();
        a.update(FilterChange::default().query("scuola"));
        a.update(FilterChange::default().source(SourceFilter::Regione));
        a.update(FilterChange::default().status(StatusFilter::ClosingSoon));

        let mut b = FilterState::default();
        b.update(FilterChange::default().status(StatusFilter::ClosingSoon));
        b.update(FilterChange::default().source(SourceFilter::Regione));
        b.update(FilterChange::default().query("scuola"));

        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_distinguishes_states() {
        let mut a = FilterState::default();
        a.update(FilterChange::default().query("scuola"));
        let mut b = FilterState::default();
        b.update(FilterChange::default().query("scuole"));
        assert_ne!(a.signature(), b.signature());

        assert_ne!(FilterState::default().signature(), a.signature());
    }

    #[test]
    fn test_default_state_serializes_to_nothing() {
        let state = FilterState::default();
        assert!(state.to_pairs().is_empty());
        assert_eq!(state.to_query_string(), "");
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let mut state = FilterState::default();
        state.update(
            FilterChange::default()
                .query("bando ricerca")
                .source(SourceFilter::Fondazioni)
                .category(CategoryFilter::Innovazione)
                .status(StatusFilter::Active)
                .amount_range(5_000, Some(250_000))
                .deadline_range(Some(date("2026-09-01")), Some(date("2026-12-31")))
                .sort(SortKey::Amount, SortDirection::Desc)
                .page_size(50),
        );
        state.update(FilterChange::default().page(3));

        let pairs = state.to_pairs();
        let restored = FilterState::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        assert_eq!(restored, state);

        let restored = FilterState::from_query_string(&state.to_query_string());
        assert_eq!(restored, state);
    }

    #[test]
    fn test_query_string_escapes_reserved_characters() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().query("arte & cultura = 100%"));

        let encoded = state.to_query_string();
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains("& "));

        let restored = FilterState::from_query_string(&encoded);
        assert_eq!(restored.query, "arte & cultura = 100%");
    }

    #[test]
    fn test_malformed_input_coerces_to_defaults() {
        // A corrupted shared address must parse, never panic
        let restored = FilterState::from_query_string(
            "source=marte&status=%%%&amount_min=abc&deadline_from=31-12-2026&sort=size&page=-2&junk=1&q=ok",
        );

        assert_eq!(restored.source, SourceFilter::All);
        assert_eq!(restored.status, StatusFilter::All);
        assert_eq!(restored.amount_min, 0);
        assert_eq!(restored.deadline_from, None);
        assert_eq!(restored.sort_key, SortKey::default());
        assert_eq!(restored.page, 1);
        assert_eq!(restored.query, "ok");
    }

    #[test]
    fn test_empty_and_garbage_strings_parse_to_defaults() {
        assert_eq!(FilterState::from_query_string(""), FilterState::default());
        assert_eq!(
            FilterState::from_query_string("&&&==&"),
            FilterState::default()
        );
    }

    #[test]
    fn test_unbounded_sentinel_equals_none() {
        let sentinel = FilterState::from_query_string(&format!(
            "amount_max={}",
            AMOUNT_UNBOUNDED_SENTINEL
        ));
        assert_eq!(sentinel.amount_max, None);
        assert_eq!(sentinel, FilterState::default());
        assert_eq!(sentinel.signature(), FilterState::default().signature());
    }

    #[test]
    fn test_amount_min_clamped_to_max() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().amount_range(90_000, Some(10_000)));
        assert_eq!(state.amount_max, Some(10_000));
        assert!(state.amount_min <= 10_000);
    }

    #[test]
    fn test_page_size_bounds() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().page_size(0));
        assert_eq!(state.page_size, DEFAULT_PAGE_SIZE);

        state.update(FilterChange::default().page_size(10_000));
        assert_eq!(state.page_size, 100);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut state = FilterState::default();
        state.update(FilterChange::default().query("x").page_size(50));
        state.reset();
        assert_eq!(state, FilterState::default());
    }
}
