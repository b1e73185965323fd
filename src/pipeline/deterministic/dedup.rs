use super::validate::ScoredDate;

const CONTEXT_SEPARATOR: &str = " | ";

/// Merge dates whose source spans overlap. Each cluster keeps its
/// highest-confidence member and the distinct contexts of every member.
/// Output is in source order.
pub fn merge_overlapping(mut dates: Vec<ScoredDate>) -> Vec<ScoredDate> {
    // Longer spans first at equal start so ties keep the fuller reading.
    dates.sort_by_key(|d| (d.start, std::cmp::Reverse(d.end)));

    let mut merged: Vec<(ScoredDate, Vec<String>, usize)> = Vec::new();
    for date in dates {
        match merged.last_mut() {
            Some((best, contexts, cluster_end)) if date.start < *cluster_end => {
                *cluster_end = (*cluster_end).max(date.end);
                if !contexts.contains(&date.date.context) {
                    contexts.push(date.date.context.clone());
                }
                if date.date.confidence > best.date.confidence {
                    *best = date;
                }
            }
            _ => {
                let contexts = vec![date.date.context.clone()];
                let end = date.end;
                merged.push((date, contexts, end));
            }
        }
    }

    merged
        .into_iter()
        .map(|(mut best, contexts, _)| {
            best.date.context = contexts.join(CONTEXT_SEPARATOR);
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateCategory, DatePrecision, ExtractedDate};

    fn scored(start: usize, end: usize, confidence: f32, context: &str) -> ScoredDate {
        ScoredDate {
            start,
            end,
            date: ExtractedDate {
                raw_text: format!("{start}-{end}"),
                parsed_date: "1923".into(),
                parsed_date_end: None,
                precision: DatePrecision::Year,
                category: DateCategory::Unknown,
                confidence,
                context: context.into(),
                is_approximate: false,
            },
        }
    }

    #[test]
    fn overlapping_spans_keep_best() {
        let out = merge_overlapping(vec![
            scored(10, 20, 0.5, "first"),
            scored(15, 25, 0.9, "second"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].date.confidence, 0.9);
        assert_eq!(out[0].date.context, "first | second");
    }

    #[test]
    fn identical_contexts_are_not_repeated() {
        let out = merge_overlapping(vec![scored(0, 4, 0.6, "same"), scored(0, 4, 0.7, "same")]);
        assert_eq!(out[0].date.context, "same");
    }

    #[test]
    fn disjoint_spans_survive_in_order() {
        let out = merge_overlapping(vec![scored(30, 34, 0.8, "b"), scored(0, 4, 0.8, "a")]);
        let starts: Vec<usize> = out.iter().map(|d| d.start).collect();
        assert_eq!(starts, vec![0, 30]);
    }

    #[test]
    fn chains_merge_transitively() {
        let out = merge_overlapping(vec![
            scored(0, 10, 0.4, "a"),
            scored(8, 18, 0.5, "b"),
            scored(16, 24, 0.6, "c"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].date.context, "a | b | c");
    }

    #[test]
    fn equal_confidence_keeps_the_longer_span() {
        let mut short = scored(0, 4, 0.7, "ctx");
        short.date.raw_text = "1920".into();
        let mut long = scored(0, 12, 0.7, "ctx");
        long.date.raw_text = "1920 to 1925".into();
        let out = merge_overlapping(vec![short, long]);
        assert_eq!(out[0].date.raw_text, "1920 to 1925");
    }

    #[test]
    fn empty_input() {
        assert!(merge_overlapping(Vec::new()).is_empty());
    }
}
