//! `artists`, `albums`, `titles`, `genres`, `roles`, `search` — catalog
//! browsing. All delegate to the injected [`crate::library::Library`]; the
//! handlers here only translate LMS's positional + `tag:value` parameter
//! style into a [`crate::library::BrowseParams`] and shape the response
//! envelope (`count` + a `*_loop` of items).

use serde_json::{json, Value};

use super::{int_param, tag_param, CommandContext};
use crate::library::BrowseParams;

fn parse_browse_params(params: &[Value]) -> BrowseParams {
    BrowseParams {
        start: int_param(params, 1).unwrap_or(0).max(0) as usize,
        count: int_param(params, 2).unwrap_or(50).max(0) as usize,
        artist_id: tag_param(params, "artist_id").map(str::to_string),
        album_id: tag_param(params, "album_id").map(str::to_string),
        genre_id: tag_param(params, "genre_id").map(str::to_string),
        search: tag_param(params, "search").map(str::to_string),
    }
}

pub async fn cmd_artists(ctx: &CommandContext, params: &[Value]) -> Value {
    let browse = parse_browse_params(params);
    let page = ctx.library.artists(&browse).await;
    json!({ "count": page.total, "artists_loop": page.items })
}

pub async fn cmd_albums(ctx: &CommandContext, params: &[Value]) -> Value {
    let browse = parse_browse_params(params);
    let page = ctx.library.albums(&browse).await;
    json!({ "count": page.total, "albums_loop": page.items })
}

pub async fn cmd_titles(ctx: &CommandContext, params: &[Value]) -> Value {
    let browse = parse_browse_params(params);
    let page = ctx.library.titles(&browse).await;
    json!({ "count": page.total, "titles_loop": page.items })
}

pub async fn cmd_genres(ctx: &CommandContext, params: &[Value]) -> Value {
    let browse = parse_browse_params(params);
    let page = ctx.library.genres(&browse).await;
    json!({ "count": page.total, "genres_loop": page.items })
}

pub async fn cmd_roles(ctx: &CommandContext, _params: &[Value]) -> Value {
    json!({ "roles_loop": ctx.library.roles().await })
}

pub async fn cmd_search(ctx: &CommandContext, params: &[Value]) -> Value {
    let browse = parse_browse_params(params);
    let page = ctx.library.search(&browse).await;
    json!({ "count": page.total, "search_loop": page.items })
}
