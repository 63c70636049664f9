//! Query configuration state.
//!
//! A [`QueryConfig`] holds every per-query knob searchd understands. Setters
//! validate their input and return an error without touching the current
//! state, so a rejected call never leaves a half-applied configuration
//! behind. [`SearchClient::add_query`](crate::client::SearchClient::add_query)
//! snapshots the state into an encoded request, after which further changes
//! only affect later queries.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::protocol::AttrType;

/// How query words are matched against documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All = 0,
    Any = 1,
    Phrase = 2,
    Boolean = 3,
    Extended = 4,
    FullScan = 5,
    Extended2 = 6,
}

/// Relevance ranking function (extended matching only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    ProximityBm25 = 0,
    Bm25 = 1,
    None = 2,
    WordCount = 3,
    Proximity = 4,
    MatchAny = 5,
    FieldMask = 6,
    Sph04 = 7,
    Expr = 8,
    Total = 9,
}

/// Match ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Relevance = 0,
    AttrDesc = 1,
    AttrAsc = 2,
    TimeSegments = 3,
    Extended = 4,
    Expr = 5,
}

/// Pre-processing applied to the group-by attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupFunc {
    Day = 0,
    Week = 1,
    Month = 2,
    Year = 3,
    Attr = 4,
    AttrPair = 5,
}

macro_rules! wire_enum {
    ($ty:ident, $label:literal, [$($variant:ident),+ $(,)?]) => {
        impl $ty {
            pub fn code(self) -> u32 {
                self as u32
            }
        }

        impl TryFrom<u32> for $ty {
            type Error = Error;

            fn try_from(code: u32) -> Result<Self> {
                $(
                    if code == $ty::$variant as u32 {
                        return Ok($ty::$variant);
                    }
                )+
                Err(Error::config(format!("unknown {} value: {code}", $label)))
            }
        }
    };
}

wire_enum!(MatchMode, "match mode", [All, Any, Phrase, Boolean, Extended, FullScan, Extended2]);
wire_enum!(
    RankMode,
    "ranking mode",
    [ProximityBm25, Bm25, None, WordCount, Proximity, MatchAny, FieldMask, Sph04, Expr, Total]
);
wire_enum!(SortMode, "sort mode", [Relevance, AttrDesc, AttrAsc, TimeSegments, Extended, Expr]);
wire_enum!(GroupFunc, "group function", [Day, Week, Month, Year, Attr, AttrPair]);

/// One attribute filter, applied in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Values {
        attr: String,
        values: Vec<u64>,
        exclude: bool,
    },
    Range {
        attr: String,
        min: u64,
        max: u64,
        exclude: bool,
    },
    FloatRange {
        attr: String,
        min: f32,
        max: f32,
        exclude: bool,
    },
}

impl Filter {
    /// Wire tag of the filter kind.
    pub fn type_code(&self) -> u32 {
        match self {
            Self::Values { .. } => 0,
            Self::Range { .. } => 1,
            Self::FloatRange { .. } => 2,
        }
    }

    pub fn attr(&self) -> &str {
        match self {
            Self::Values { attr, .. } | Self::Range { attr, .. } | Self::FloatRange { attr, .. } => {
                attr
            }
        }
    }

    pub fn exclude(&self) -> bool {
        match self {
            Self::Values { exclude, .. }
            | Self::Range { exclude, .. }
            | Self::FloatRange { exclude, .. } => *exclude,
        }
    }
}

/// Per-document value substituted for an attribute at query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideValue {
    Int(u32),
    Float(f32),
    BigInt(u64),
}

/// Attribute override: `attr` takes `values[doc_id]` for the listed documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub attr: String,
    pub attr_type: AttrType,
    pub values: BTreeMap<u64, OverrideValue>,
}

/// Reference point for geodistance sorting and filtering, in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoAnchor {
    pub lat_attr: String,
    pub lon_attr: String,
    pub lat: f32,
    pub lon: f32,
}

/// Convert degrees to the radians expected by [`QueryConfig::set_geo_anchor`].
pub fn degree_to_radian(degree: f32) -> f32 {
    degree * std::f32::consts::PI / 180.0
}

const QUERY_SPECIALS: &[char] = &[
    '\\', '(', ')', '|', '-', '!', '@', '~', '"', '&', '/', '^', '$', '=',
];

/// Backslash-escape extended query syntax so `text` is matched literally.
pub fn escape_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if QUERY_SPECIALS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub const DEFAULT_LIMIT: u32 = 20;
pub const DEFAULT_MAX_MATCHES: u32 = 1000;
pub const DEFAULT_GROUP_SORT: &str = "@group desc";
pub const DEFAULT_SELECT: &str = "*";

/// Mutable per-query settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub(crate) offset: u32,
    pub(crate) limit: u32,
    pub(crate) max_matches: u32,
    pub(crate) cutoff: u32,
    pub(crate) max_query_time: u32,
    pub(crate) match_mode: MatchMode,
    pub(crate) rank_mode: RankMode,
    pub(crate) rank_expr: String,
    pub(crate) sort_mode: SortMode,
    pub(crate) sort_by: String,
    pub(crate) min_id: u64,
    pub(crate) max_id: u64,
    pub(crate) weights: Vec<u32>,
    pub(crate) field_weights: BTreeMap<String, u32>,
    pub(crate) index_weights: BTreeMap<String, u32>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) overrides: BTreeMap<String, Override>,
    pub(crate) geo_anchor: Option<GeoAnchor>,
    pub(crate) group_by: String,
    pub(crate) group_func: GroupFunc,
    pub(crate) group_sort: String,
    pub(crate) group_distinct: String,
    pub(crate) select: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            max_matches: DEFAULT_MAX_MATCHES,
            cutoff: 0,
            max_query_time: 0,
            // legacy modes are converted server-side anyway
            match_mode: MatchMode::Extended,
            rank_mode: RankMode::ProximityBm25,
            rank_expr: String::new(),
            sort_mode: SortMode::Relevance,
            sort_by: String::new(),
            min_id: 0,
            max_id: 0,
            weights: Vec::new(),
            field_weights: BTreeMap::new(),
            index_weights: BTreeMap::new(),
            filters: Vec::new(),
            overrides: BTreeMap::new(),
            geo_anchor: None,
            group_by: String::new(),
            group_func: GroupFunc::Day,
            group_sort: DEFAULT_GROUP_SORT.to_string(),
            group_distinct: String::new(),
            select: DEFAULT_SELECT.to_string(),
        }
    }
}

fn collect_weights<I, S>(weights: I, what: &str) -> Result<BTreeMap<String, u32>>
where
    I: IntoIterator<Item = (S, i32)>,
    S: Into<String>,
{
    let mut out = BTreeMap::new();
    for (name, weight) in weights {
        let name = name.into();
        if weight < 1 {
            return Err(Error::config(format!(
                "{what} weights must be positive, {name}: {weight}"
            )));
        }
        out.insert(name, weight as u32);
    }
    Ok(out)
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn max_matches(&self) -> u32 {
        self.max_matches
    }

    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    pub fn rank_mode(&self) -> RankMode {
        self.rank_mode
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn id_range(&self) -> (u64, u64) {
        (self.min_id, self.max_id)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn overrides(&self) -> impl Iterator<Item = &Override> {
        self.overrides.values()
    }

    pub fn geo_anchor(&self) -> Option<&GeoAnchor> {
        self.geo_anchor.as_ref()
    }

    pub fn group_by(&self) -> (&str, GroupFunc, &str) {
        (&self.group_by, self.group_func, &self.group_sort)
    }

    pub fn select(&self) -> &str {
        &self.select
    }

    /// Result window (`offset`, `limit`), server-side match cap and early-stop cutoff.
    pub fn set_limits(
        &mut self,
        offset: i32,
        limit: i32,
        max_matches: i32,
        cutoff: i32,
    ) -> Result<&mut Self> {
        if offset < 0 {
            return Err(Error::config(format!("offset must not be negative: {offset}")));
        }
        if limit <= 0 {
            return Err(Error::config(format!("limit must be positive: {limit}")));
        }
        if max_matches <= 0 {
            return Err(Error::config(format!(
                "max matches must be positive: {max_matches}"
            )));
        }
        if cutoff < 0 {
            return Err(Error::config(format!("cutoff must not be negative: {cutoff}")));
        }
        self.offset = offset as u32;
        self.limit = limit as u32;
        self.max_matches = max_matches as u32;
        self.cutoff = cutoff as u32;
        Ok(self)
    }

    /// Per-index query time cap in milliseconds; 0 disables it.
    pub fn set_max_query_time(&mut self, millis: i32) -> Result<&mut Self> {
        if millis < 0 {
            return Err(Error::config(format!(
                "max query time must not be negative: {millis}"
            )));
        }
        self.max_query_time = millis as u32;
        Ok(self)
    }

    /// Register a per-document override for `attr`, replacing any earlier one.
    pub fn set_override(
        &mut self,
        attr: &str,
        attr_type: AttrType,
        values: BTreeMap<u64, OverrideValue>,
    ) -> Result<&mut Self> {
        if attr.is_empty() {
            return Err(Error::config("override attribute name is empty"));
        }
        match attr_type {
            AttrType::Integer
            | AttrType::Timestamp
            | AttrType::Ordinal
            | AttrType::Bool
            | AttrType::Float
            | AttrType::BigInt
            | AttrType::String
            | AttrType::Multi
            | AttrType::Multi64 => {}
            other => {
                return Err(Error::config(format!(
                    "invalid override attribute type: {}",
                    other.code()
                )));
            }
        }
        self.overrides.insert(
            attr.to_string(),
            Override {
                attr: attr.to_string(),
                attr_type,
                values,
            },
        );
        Ok(self)
    }

    pub fn reset_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Select list: attributes or expressions with optional aliases.
    pub fn set_select(&mut self, select: &str) -> Result<&mut Self> {
        if select.is_empty() {
            return Err(Error::config("select list is empty"));
        }
        self.select = select.to_string();
        Ok(self)
    }

    pub fn set_match_mode(&mut self, mode: MatchMode) -> &mut Self {
        self.match_mode = mode;
        self
    }

    /// Ranker, with an expression only for [`RankMode::Expr`].
    pub fn set_ranking_mode(&mut self, ranker: RankMode, expr: Option<&str>) -> Result<&mut Self> {
        if let Some(expr) = expr {
            if ranker != RankMode::Expr {
                return Err(Error::config(format!(
                    "rank expression requires the expression ranker, got {ranker:?}: {expr}"
                )));
            }
            self.rank_expr = expr.to_string();
        }
        self.rank_mode = ranker;
        Ok(self)
    }

    /// Sort mode and clause. Only relevance sorting works without a clause.
    pub fn set_sort_mode(&mut self, mode: SortMode, sort_by: &str) -> Result<&mut Self> {
        if mode != SortMode::Relevance && sort_by.is_empty() {
            return Err(Error::config(format!(
                "sort clause must not be empty in mode {mode:?}"
            )));
        }
        self.sort_mode = mode;
        self.sort_by = sort_by.to_string();
        Ok(self)
    }

    /// Legacy positional field weights, in schema order.
    pub fn set_weights(&mut self, weights: &[i32]) -> Result<&mut Self> {
        if let Some(bad) = weights.iter().find(|w| **w < 1) {
            return Err(Error::config(format!("weights must be positive: {bad}")));
        }
        self.weights = weights.iter().map(|w| *w as u32).collect();
        Ok(self)
    }

    /// Named field weights. Unlisted fields keep weight 1.
    pub fn set_field_weights<I, S>(&mut self, weights: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        self.field_weights = collect_weights(weights, "field")?;
        Ok(self)
    }

    /// Per-index weights for multi-index queries.
    pub fn set_index_weights<I, S>(&mut self, weights: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        self.index_weights = collect_weights(weights, "index")?;
        Ok(self)
    }

    /// Restrict matches to `min..=max` document ids; `0, 0` means unbounded.
    pub fn set_id_range(&mut self, min: u64, max: u64) -> Result<&mut Self> {
        if min > max {
            return Err(Error::config(format!("id range min > max: {min} > {max}")));
        }
        self.min_id = min;
        self.max_id = max;
        Ok(self)
    }

    /// Keep (or with `exclude`, drop) documents whose `attr` is one of `values`.
    pub fn set_filter(&mut self, attr: &str, values: &[u64], exclude: bool) -> Result<&mut Self> {
        if attr.is_empty() {
            return Err(Error::config("filter attribute name is empty"));
        }
        if values.is_empty() {
            return Err(Error::config(format!("filter values for {attr} are empty")));
        }
        self.filters.push(Filter::Values {
            attr: attr.to_string(),
            values: values.to_vec(),
            exclude,
        });
        Ok(self)
    }

    /// Integer range filter, bounds inclusive.
    pub fn set_filter_range(
        &mut self,
        attr: &str,
        min: u64,
        max: u64,
        exclude: bool,
    ) -> Result<&mut Self> {
        if attr.is_empty() {
            return Err(Error::config("filter attribute name is empty"));
        }
        if min > max {
            return Err(Error::config(format!(
                "filter range on {attr}: min > max: {min} > {max}"
            )));
        }
        self.filters.push(Filter::Range {
            attr: attr.to_string(),
            min,
            max,
            exclude,
        });
        Ok(self)
    }

    /// Float range filter, bounds inclusive.
    pub fn set_filter_float_range(
        &mut self,
        attr: &str,
        min: f32,
        max: f32,
        exclude: bool,
    ) -> Result<&mut Self> {
        if attr.is_empty() {
            return Err(Error::config("filter attribute name is empty"));
        }
        if min > max || min.is_nan() || max.is_nan() {
            return Err(Error::config(format!(
                "float filter range on {attr}: invalid bounds {min}..{max}"
            )));
        }
        self.filters.push(Filter::FloatRange {
            attr: attr.to_string(),
            min,
            max,
            exclude,
        });
        Ok(self)
    }

    /// Anchor point for `@geodist`; coordinates in radians.
    pub fn set_geo_anchor(
        &mut self,
        lat_attr: &str,
        lon_attr: &str,
        lat: f32,
        lon: f32,
    ) -> Result<&mut Self> {
        if lat_attr.is_empty() {
            return Err(Error::config("latitude attribute name is empty"));
        }
        if lon_attr.is_empty() {
            return Err(Error::config("longitude attribute name is empty"));
        }
        self.geo_anchor = Some(GeoAnchor {
            lat_attr: lat_attr.to_string(),
            lon_attr: lon_attr.to_string(),
            lat,
            lon,
        });
        Ok(self)
    }

    /// Drop all filters and the geo anchor.
    pub fn reset_filters(&mut self) {
        self.filters.clear();
        self.geo_anchor = None;
    }

    pub fn set_group_by(&mut self, attr: &str, func: GroupFunc, group_sort: &str) -> &mut Self {
        self.group_by = attr.to_string();
        self.group_func = func;
        self.group_sort = group_sort.to_string();
        self
    }

    /// Attribute whose distinct values are counted per group.
    pub fn set_group_distinct(&mut self, attr: &str) -> Result<&mut Self> {
        if attr.is_empty() {
            return Err(Error::config("group distinct attribute is empty"));
        }
        self.group_distinct = attr.to_string();
        Ok(self)
    }

    pub fn reset_group_by(&mut self) {
        self.group_by.clear();
        self.group_func = GroupFunc::Day;
        self.group_sort = DEFAULT_GROUP_SORT.to_string();
        self.group_distinct.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("plain words"), "plain words");
        assert_eq!(escape_query("a-b"), "a\\-b");
        assert_eq!(escape_query(r#"@title "x" | y"#), r#"\@title \"x\" \| y"#);
        assert_eq!(escape_query(r"c:\dir"), r"c:\\dir");
        assert_eq!(escape_query("$=^/&~!()"), r"\$\=\^\/\&\~\!\(\)");
    }

    #[test]
    fn test_defaults() {
        let q = QueryConfig::default();
        assert_eq!(q.limit(), 20);
        assert_eq!(q.max_matches(), 1000);
        assert_eq!(q.match_mode(), MatchMode::Extended);
        assert_eq!(q.rank_mode(), RankMode::ProximityBm25);
        assert_eq!(q.group_by(), ("", GroupFunc::Day, "@group desc"));
        assert_eq!(q.select(), "*");
    }

    #[test]
    fn test_negative_offset_leaves_limits_untouched() {
        let mut q = QueryConfig::default();
        q.set_limits(10, 50, 500, 0).unwrap();
        let err = q.set_limits(-1, 5, 5, 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!((q.offset(), q.limit(), q.max_matches()), (10, 50, 500));
    }

    #[test]
    fn test_limits_validation() {
        let mut q = QueryConfig::default();
        assert!(q.set_limits(0, 0, 10, 0).is_err());
        assert!(q.set_limits(0, 10, 0, 0).is_err());
        assert!(q.set_limits(0, 10, 10, -3).is_err());
        q.set_limits(5, 10, 100, 1000).unwrap();
        assert_eq!(q.cutoff(), 1000);
    }

    #[test]
    fn test_inverted_range_leaves_filters_untouched() {
        let mut q = QueryConfig::default();
        q.set_filter("group_id", &[1, 2], false).unwrap();
        assert!(q.set_filter_range("price", 10, 5, false).is_err());
        assert!(q.set_filter_float_range("score", 2.0, 1.0, false).is_err());
        assert!(q.set_filter_float_range("score", f32::NAN, 1.0, false).is_err());
        assert_eq!(q.filters().len(), 1);
        assert_eq!(q.filters()[0].attr(), "group_id");
    }

    #[test]
    fn test_filters_keep_insertion_order() {
        let mut q = QueryConfig::default();
        q.set_filter_range("b", 1, 2, true).unwrap();
        q.set_filter("a", &[3], false).unwrap();
        q.set_filter_float_range("c", 0.5, 1.5, false).unwrap();
        let tags: Vec<u32> = q.filters().iter().map(Filter::type_code).collect();
        assert_eq!(tags, vec![1, 0, 2]);
        assert!(q.filters()[0].exclude());
    }

    #[test]
    fn test_empty_filter_inputs_rejected() {
        let mut q = QueryConfig::default();
        assert!(q.set_filter("", &[1], false).is_err());
        assert!(q.set_filter("a", &[], false).is_err());
        assert!(q.filters().is_empty());
    }

    #[test]
    fn test_reset_filters_clears_geo_anchor() {
        let mut q = QueryConfig::default();
        q.set_geo_anchor("lat", "lon", degree_to_radian(45.0), 0.1)
            .unwrap();
        q.set_filter("a", &[1], false).unwrap();
        q.reset_filters();
        assert!(q.filters().is_empty());
        assert!(q.geo_anchor().is_none());
    }

    #[test]
    fn test_geo_anchor_requires_names() {
        let mut q = QueryConfig::default();
        assert!(q.set_geo_anchor("", "lon", 0.0, 0.0).is_err());
        assert!(q.set_geo_anchor("lat", "", 0.0, 0.0).is_err());
        assert!(q.geo_anchor().is_none());
    }

    #[test]
    fn test_weights_must_be_positive() {
        let mut q = QueryConfig::default();
        q.set_field_weights([("title", 10), ("body", 1)]).unwrap();
        assert!(q.set_field_weights([("title", 0)]).is_err());
        assert_eq!(q.field_weights.get("title"), Some(&10));
        assert!(q.set_index_weights([("main", -1)]).is_err());
        assert!(q.set_weights(&[1, 0]).is_err());
        q.set_weights(&[3, 1]).unwrap();
        assert_eq!(q.weights, vec![3, 1]);
    }

    #[test]
    fn test_id_range() {
        let mut q = QueryConfig::default();
        assert!(q.set_id_range(10, 1).is_err());
        q.set_id_range(1, 10).unwrap();
        assert_eq!(q.id_range(), (1, 10));
    }

    #[test]
    fn test_rank_expr_requires_expr_ranker() {
        let mut q = QueryConfig::default();
        assert!(q.set_ranking_mode(RankMode::Bm25, Some("sum(lcs)")).is_err());
        assert_eq!(q.rank_mode(), RankMode::ProximityBm25);
        q.set_ranking_mode(RankMode::Expr, Some("sum(lcs*user_weight)"))
            .unwrap();
        assert_eq!(q.rank_expr, "sum(lcs*user_weight)");
    }

    #[test]
    fn test_sort_clause_required_outside_relevance() {
        let mut q = QueryConfig::default();
        assert!(q.set_sort_mode(SortMode::AttrDesc, "").is_err());
        q.set_sort_mode(SortMode::Relevance, "").unwrap();
        q.set_sort_mode(SortMode::Extended, "@weight desc").unwrap();
        assert_eq!(q.sort_mode(), SortMode::Extended);
    }

    #[test]
    fn test_override_validation() {
        let mut q = QueryConfig::default();
        let values = BTreeMap::from([(1, OverrideValue::Int(5))]);
        assert!(q.set_override("", AttrType::Integer, values.clone()).is_err());
        assert!(q.set_override("a", AttrType::None, values.clone()).is_err());
        q.set_override("a", AttrType::Integer, values).unwrap();
        assert_eq!(q.overrides().count(), 1);
        q.reset_overrides();
        assert_eq!(q.overrides().count(), 0);
    }

    #[test]
    fn test_group_by_reset() {
        let mut q = QueryConfig::default();
        q.set_group_by("category", GroupFunc::Attr, "@count desc");
        q.set_group_distinct("vendor").unwrap();
        assert!(q.set_group_distinct("").is_err());
        q.reset_group_by();
        assert_eq!(q.group_by(), ("", GroupFunc::Day, "@group desc"));
        assert!(q.group_distinct.is_empty());
    }

    #[test]
    fn test_enum_codes() {
        assert_eq!(MatchMode::try_from(6).unwrap(), MatchMode::Extended2);
        assert!(MatchMode::try_from(7).is_err());
        assert_eq!(RankMode::Expr.code(), 8);
        assert_eq!(SortMode::try_from(5).unwrap(), SortMode::Expr);
        assert!(GroupFunc::try_from(6).is_err());
    }

    #[test]
    fn test_degree_to_radian() {
        assert!((degree_to_radian(180.0) - std::f32::consts::PI).abs() < 1e-6);
    }
}
