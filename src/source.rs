//! # Sources
//! The fixed set of upstream hot-board platforms and their static metadata:
//! canonical name, upstream `type=` query identifier, display label and
//! dashboard group.
//!
//! `Source` variants are declared in the same order as [`SOURCE_TABLE`], so
//! metadata lookup is a direct index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Dashboard grouping of sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceGroup {
    Community,
    News,
    Tech,
    Game,
    Other,
}

/// One upstream trending-topics platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    // Video/Community
    Bilibili,
    Acfun,
    Weibo,
    Zhihu,
    ZhihuDaily,
    Douyin,
    Kuaishou,
    DoubanMovie,
    DoubanGroup,
    Tieba,
    Hupu,
    Ngabbs,
    V2ex,
    #[serde(rename = "_52pojie")]
    Pojie52,
    Hostloc,
    Coolapk,

    // News/Info
    Baidu,
    ThePaper,
    Toutiao,
    QqNews,
    Sina,
    SinaNews,
    NeteaseNews,
    Huxiu,
    Ifanr,

    // Tech/IT
    Sspai,
    ITHome,
    ITHomeXijiayi,
    Juejin,
    Jianshu,
    Guokr,
    #[serde(rename = "_36Kr")]
    Kr36,
    #[serde(rename = "_51Cto")]
    Cto51,
    Csdn,
    Nodeseek,
    HelloGithub,

    // Game
    Lol,
    Genshin,
    Honkai,
    Starrail,

    // Other
    Weread,
    WeatherAlarm,
    Earthquake,
    History,
}

/// Static metadata for one source.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub source: Source,
    /// Canonical name used on the wire and in query strings.
    pub name: &'static str,
    /// Upstream `type=` parameter.
    pub query_id: &'static str,
    pub label: &'static str,
    pub group: SourceGroup,
}

const fn info(
    source: Source,
    name: &'static str,
    query_id: &'static str,
    label: &'static str,
    group: SourceGroup,
) -> SourceInfo {
    SourceInfo {
        source,
        name,
        query_id,
        label,
        group,
    }
}

use SourceGroup::{Community, Game, News, Other, Tech};

pub const SOURCE_TABLE: [SourceInfo; 44] = [
    info(Source::Bilibili, "Bilibili", "bilibili", "Bilibili", Community),
    info(Source::Acfun, "Acfun", "acfun", "AcFun", Community),
    info(Source::Weibo, "Weibo", "weibo", "微博", Community),
    info(Source::Zhihu, "Zhihu", "zhihu", "知乎", Community),
    info(Source::ZhihuDaily, "ZhihuDaily", "zhihu-daily", "知乎日报", Community),
    info(Source::Douyin, "Douyin", "douyin", "抖音", Community),
    info(Source::Kuaishou, "Kuaishou", "kuaishou", "快手", Community),
    info(Source::DoubanMovie, "DoubanMovie", "douban-movie", "豆瓣电影", Community),
    info(Source::DoubanGroup, "DoubanGroup", "douban-group", "豆瓣小组", Community),
    info(Source::Tieba, "Tieba", "tieba", "贴吧", Community),
    info(Source::Hupu, "Hupu", "hupu", "虎扑", Community),
    info(Source::Ngabbs, "Ngabbs", "ngabbs", "NGA", Community),
    info(Source::V2ex, "V2ex", "v2ex", "V2EX", Community),
    info(Source::Pojie52, "_52pojie", "52pojie", "吾爱破解", Community),
    info(Source::Hostloc, "Hostloc", "hostloc", "Hostloc", Community),
    info(Source::Coolapk, "Coolapk", "coolapk", "酷安", Community),
    info(Source::Baidu, "Baidu", "baidu", "百度", News),
    info(Source::ThePaper, "ThePaper", "thepaper", "澎湃", News),
    info(Source::Toutiao, "Toutiao", "toutiao", "头条", News),
    info(Source::QqNews, "QqNews", "qq-news", "腾讯新闻", News),
    info(Source::Sina, "Sina", "sina", "新浪热搜", News),
    info(Source::SinaNews, "SinaNews", "sina-news", "新浪新闻", News),
    info(Source::NeteaseNews, "NeteaseNews", "netease-news", "网易新闻", News),
    info(Source::Huxiu, "Huxiu", "huxiu", "虎嗅", News),
    info(Source::Ifanr, "Ifanr", "ifanr", "爱范儿", News),
    info(Source::Sspai, "Sspai", "sspai", "少数派", Tech),
    info(Source::ITHome, "ITHome", "ithome", "IT之家", Tech),
    info(Source::ITHomeXijiayi, "ITHomeXijiayi", "ithome-xijiayi", "IT之家喜加一", Tech),
    info(Source::Juejin, "Juejin", "juejin", "掘金", Tech),
    info(Source::Jianshu, "Jianshu", "jianshu", "简书", Tech),
    info(Source::Guokr, "Guokr", "guokr", "果壳", Tech),
    info(Source::Kr36, "_36Kr", "36kr", "36氪", Tech),
    info(Source::Cto51, "_51Cto", "51cto", "51CTO", Tech),
    info(Source::Csdn, "Csdn", "csdn", "CSDN", Tech),
    info(Source::Nodeseek, "Nodeseek", "nodeseek", "NodeSeek", Tech),
    info(Source::HelloGithub, "HelloGithub", "hellogithub", "HelloGitHub", Tech),
    info(Source::Lol, "Lol", "lol", "英雄联盟", Game),
    info(Source::Genshin, "Genshin", "genshin", "原神", Game),
    info(Source::Honkai, "Honkai", "honkai", "崩坏3", Game),
    info(Source::Starrail, "Starrail", "starrail", "星穹铁道", Game),
    info(Source::Weread, "Weread", "weread", "微信读书", Other),
    info(Source::WeatherAlarm, "WeatherAlarm", "weatheralarm", "天气预警", Other),
    info(Source::Earthquake, "Earthquake", "earthquake", "地震速报", Other),
    info(Source::History, "History", "history", "历史上的今天", Other),
];

impl Source {
    /// Every known source, in declaration order.
    pub fn all() -> Vec<Source> {
        SOURCE_TABLE.iter().map(|i| i.source).collect()
    }

    pub fn info(self) -> &'static SourceInfo {
        &SOURCE_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.info().name
    }

    pub fn label(self) -> &'static str {
        self.info().label
    }

    pub fn group(self) -> SourceGroup {
        self.info().group
    }

    /// Case-sensitive lookup by canonical name (`"Weibo"`, `"_52pojie"`).
    pub fn from_name(name: &str) -> Option<Source> {
        SOURCE_TABLE
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.source)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source `{0}`")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::from_name(s.trim()).ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Source → upstream query identifier. A missing key is a configuration gap.
pub type QueryTable = HashMap<Source, String>;

/// The built-in query table covering every known source.
pub fn default_query_table() -> QueryTable {
    SOURCE_TABLE
        .iter()
        .map(|i| (i.source, i.query_id.to_string()))
        .collect()
}

/// Parse a comma-separated list of source names, dropping unknown ones.
pub fn parse_source_list(csv: &str) -> Vec<Source> {
    csv.split(',')
        .filter_map(|name| name.trim().parse::<Source>().ok())
        .collect()
}
