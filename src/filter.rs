// src/filter.rs
//! Post-processing of the unified item set. Pure, synchronous, no I/O.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::source::Source;
use crate::types::TrendItem;

/// Optional, independently applied (AND) filter criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Allow-list; `None` or empty means every source.
    pub sources: Option<Vec<Source>>,
    /// Keep items with `score >= min_score`.
    pub min_score: Option<u64>,
    /// Case-insensitive substring of the title, matched as given; empty means
    /// no constraint.
    pub keyword: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.source_allow_list().is_none() && self.min_score.is_none() && self.needle().is_none()
    }

    fn source_allow_list(&self) -> Option<&[Source]> {
        self.sources.as_deref().filter(|s| !s.is_empty())
    }

    fn needle(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }
}

pub fn filter(items: Vec<TrendItem>, criteria: &FilterCriteria) -> Vec<TrendItem> {
    if criteria.is_empty() {
        return items;
    }
    let allow = criteria.source_allow_list();
    let needle = criteria.needle();

    items
        .into_iter()
        .filter(|it| allow.map_or(true, |a| a.contains(&it.source)))
        .filter(|it| criteria.min_score.map_or(true, |m| it.score >= m))
        .filter(|it| {
            needle
                .as_deref()
                .map_or(true, |n| it.title.to_lowercase().contains(n))
        })
        .collect()
}

/// Stable partition by source; relative order inside each group is kept.
pub fn group_by_source(items: Vec<TrendItem>) -> BTreeMap<Source, Vec<TrendItem>> {
    let mut groups: BTreeMap<Source, Vec<TrendItem>> = BTreeMap::new();
    for it in items {
        groups.entry(it.source).or_default().push(it);
    }
    groups
}

/// Single ranked view: score descending, ties keep their input order.
pub fn rank_by_score(mut items: Vec<TrendItem>) -> Vec<TrendItem> {
    items.sort_by(|a, b| b.score.cmp(&a.score));
    items
}
