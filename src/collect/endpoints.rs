//! Per-content-type endpoint table.
//!
//! Every content type pages through its own endpoint with its own cursor
//! parameter, page size, and parameter bag. That variability lives here as
//! lookup-table data; the fetch loop never branches on content type.

use crate::sign::EndpointKind;
use crate::target::ContentType;

/// Response fields that may carry the next-page cursor, probed in order.
pub const CURSOR_FIELDS: &[&str] = &["max_cursor", "cursor", "min_time"];

/// Response fields that may carry the page's entry list, probed in order.
pub const LIST_FIELDS: &[&str] = &[
    "aweme_list",
    "user_list",
    "data",
    "followings",
    "followers",
];

/// HTTP shape of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Plain GET with query parameters.
    Get,
    /// POST whose cursor and count travel in a form body.
    PostForm,
}

/// Static description of one content type's endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    /// API path.
    pub uri: &'static str,
    /// Request shape.
    pub method: Method,
    /// Items requested per page.
    pub page_size: u32,
    /// Name of the cursor parameter this endpoint expects.
    pub cursor_param: &'static str,
    /// Whether pagination threads the first page's `log_pb.impr_id` back
    /// as a `search_id` parameter.
    pub needs_search_id: bool,
    /// Which signing sub-routine the endpoint requires.
    pub kind: EndpointKind,
    /// Whether the endpoint is a single fetch rather than a paged feed.
    pub single_fetch: bool,
}

/// Looks up the endpoint description for a content type.
#[must_use]
pub fn spec(content_type: ContentType) -> &'static EndpointSpec {
    match content_type {
        ContentType::Post => &EndpointSpec {
            uri: "/aweme/v1/web/aweme/post/",
            method: Method::Get,
            page_size: 5,
            cursor_param: "max_cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Like => &EndpointSpec {
            uri: "/aweme/v1/web/aweme/favorite/",
            method: Method::Get,
            page_size: 18,
            cursor_param: "max_cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Favorite => &EndpointSpec {
            uri: "/aweme/v1/web/aweme/listcollection/",
            method: Method::PostForm,
            page_size: 18,
            cursor_param: "cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Music => &EndpointSpec {
            uri: "/aweme/v1/web/music/aweme/",
            method: Method::Get,
            page_size: 18,
            cursor_param: "cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Hashtag => &EndpointSpec {
            uri: "/aweme/v1/web/challenge/aweme/",
            method: Method::Get,
            page_size: 18,
            cursor_param: "cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Collection => &EndpointSpec {
            uri: "/aweme/v1/web/mix/aweme/",
            method: Method::Get,
            page_size: 18,
            cursor_param: "cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Search => &EndpointSpec {
            uri: "/aweme/v1/web/search/item/",
            method: Method::Get,
            page_size: 18,
            cursor_param: "offset",
            needs_search_id: true,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::User => &EndpointSpec {
            uri: "/aweme/v1/web/discover/search/",
            method: Method::Get,
            page_size: 10,
            cursor_param: "offset",
            needs_search_id: true,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Follow => &EndpointSpec {
            uri: "/aweme/v1/web/user/following/list/",
            method: Method::Get,
            page_size: 20,
            cursor_param: "max_time",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::Fans => &EndpointSpec {
            uri: "/aweme/v1/web/user/follower/list/",
            method: Method::Get,
            page_size: 20,
            cursor_param: "max_time",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: false,
        },
        ContentType::SingleItem => &EndpointSpec {
            uri: "/aweme/v1/web/aweme/detail/",
            method: Method::Get,
            page_size: 1,
            cursor_param: "cursor",
            needs_search_id: false,
            kind: EndpointKind::Detail,
            single_fetch: true,
        },
    }
}

/// Request parameters for one page fetch.
#[derive(Debug)]
pub struct RequestParts {
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// Form body for [`Method::PostForm`] endpoints.
    pub body: Option<Vec<(String, String)>>,
}

/// Builds the parameter bag for one page of `content_type`.
///
/// `search_id` is empty until the first page of a search-family endpoint
/// returns one.
#[must_use]
pub fn request_parts(
    content_type: ContentType,
    resolved_id: &str,
    cursor: i64,
    search_id: &str,
) -> RequestParts {
    let ep = spec(content_type);
    let cursor_value = cursor.to_string();
    let count = ep.page_size.to_string();
    let p = |k: &str, v: &str| (k.to_string(), v.to_string());

    let (params, body) = match content_type {
        ContentType::Post => (
            vec![
                p("publish_video_strategy_type", "2"),
                p(ep.cursor_param, &cursor_value),
                p("locate_query", "false"),
                p("show_live_replay_strategy", "1"),
                p("need_time_list", "0"),
                p("time_list_query", "0"),
                p("whale_cut_token", ""),
                p("count", &count),
                p("sec_user_id", resolved_id),
            ],
            None,
        ),
        ContentType::Like => (
            vec![
                p("publish_video_strategy_type", "2"),
                p(ep.cursor_param, &cursor_value),
                p("cut_version", "1"),
                p("count", &count),
                p("sec_user_id", resolved_id),
            ],
            None,
        ),
        ContentType::Favorite => (
            vec![p("publish_video_strategy_type", "2")],
            Some(vec![
                p(ep.cursor_param, &cursor_value),
                p("count", &count),
            ]),
        ),
        ContentType::Music => (
            vec![
                p(ep.cursor_param, &cursor_value),
                p("count", &count),
                p("music_id", resolved_id),
            ],
            None,
        ),
        ContentType::Hashtag => (
            vec![
                p(ep.cursor_param, &cursor_value),
                // 0 mixed, 1 hottest, 2 newest
                p("sort_type", "1"),
                p("count", &count),
                p("ch_id", resolved_id),
            ],
            None,
        ),
        ContentType::Collection => (
            vec![
                p(ep.cursor_param, &cursor_value),
                p("count", &count),
                p("mix_id", resolved_id),
            ],
            None,
        ),
        ContentType::Search => (
            vec![
                p("search_id", search_id),
                p("search_channel", "aweme_video_web"),
                p("search_source", "tab_search"),
                p("query_correct_type", "1"),
                p("from_group_id", ""),
                p("is_filter_search", "1"),
                p("list_type", "single"),
                p("need_filter_settings", "1"),
                p(ep.cursor_param, &cursor_value),
                p("sort_type", "1"),
                p("enable_history", "1"),
                p("search_range", "0"),
                p("publish_time", "0"),
                p("filter_duration", ""),
                p("count", &count),
                p("keyword", resolved_id),
            ],
            None,
        ),
        ContentType::User => (
            vec![
                p("count", &count),
                p("from_group_id", ""),
                p("is_filter_search", "0"),
                p("keyword", resolved_id),
                p("list_type", "single"),
                p("need_filter_settings", "0"),
                p(ep.cursor_param, &cursor_value),
                p("search_id", search_id),
                p("query_correct_type", "1"),
                p("search_channel", "aweme_user_web"),
                p("search_source", "tab_search"),
            ],
            None,
        ),
        ContentType::Follow | ContentType::Fans => (
            vec![
                p("address_book_access", "0"),
                p("count", &count),
                p("gps_access", "0"),
                p("is_top", "1"),
                p(ep.cursor_param, &cursor_value),
                p("min_time", "0"),
                p("offset", "0"),
                p(
                    "source_type",
                    if content_type == ContentType::Follow {
                        "1"
                    } else {
                        "3"
                    },
                ),
                p("sec_user_id", resolved_id),
            ],
            None,
        ),
        ContentType::SingleItem => (vec![p("aweme_id", resolved_id)], None),
    };

    RequestParts { params, body }
}
