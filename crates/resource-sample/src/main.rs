use resource_sample::lifecycle::{load_config, BlogSystem};
use resource_stream::navigation::route;
use resource_stream::tracing::setup_tracing;
use resource_stream::InitOptions;
use serde_json::json;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    info!("Starting blog demo");

    let config = load_config().map_err(|e| e.to_string())?;
    let system = BlogSystem::new(config).map_err(|e| e.to_string())?;
    system.seed().await.map_err(|e| e.to_string())?;

    let (controller, route) = route();
    let posts = system
        .posts
        .initialize(InitOptions::new().route(route).load_more())
        .map_err(|e| e.to_string())?;
    let comments = system
        .comments
        .initialize(InitOptions::new().parent(system.posts.as_parent()))
        .map_err(|e| e.to_string())?;

    // Browse the list, one page at a time
    let span = tracing::info_span!("post_list");
    async {
        let mut list = posts.collection();
        let page = list.ready().await.map_err(|e| e.to_string())?;
        info!(shown = page.len(), "First page loaded");

        posts.load_more();
        if let Some(snapshot) = list.next().await {
            let shown = snapshot.ready().map_or(0, |page| page.len());
            info!(shown, state = ?posts.status().borrow().state, "More posts loaded");
        }
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    // Open a post; its comments follow automatically
    let span = tracing::info_span!("post_detail", id = 3);
    async {
        controller.set_param("id", "3");
        let post = posts.item().ready().await.map_err(|e| e.to_string())?;
        info!(title = %post.data.title, price = post.data.price, "Post opened");

        let thread = comments
            .collection()
            .ready()
            .await
            .map_err(|e| e.to_string())?;
        for comment in thread.values() {
            info!(id = comment.id, body = %comment.body, "Comment");
        }
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    // Edit the open post and refresh the streams
    let span = tracing::info_span!("post_edit", id = 3);
    let edit = async {
        let mut detail = posts.item().subscribe();
        system
            .posts
            .update(3, json!({"title": "Post 3 (edited)", "price": 19.99}))
            .await
            .map_err(|e| e.to_string())?;
        system
            .posts
            .toggle(3, json!({"field": "published"}))
            .await
            .map_err(|e| e.to_string())?;
        posts.refresh();

        if let Some(snapshot) = detail.next().await {
            match snapshot.ready() {
                Some(post) => info!(
                    title = %post.data.title,
                    price = post.data.price,
                    published = post.data.published,
                    "Post refreshed"
                ),
                None => error!(snapshot = ?snapshot, "Refresh did not produce the post"),
            }
        }
        Ok::<_, String>(())
    }
    .instrument(span)
    .await;

    if let Err(e) = edit {
        error!(error = %e, "Editing the post failed");
    }

    comments.shutdown().await;
    posts.shutdown().await;
    system.shutdown().await?;

    info!("Demo completed successfully");
    Ok(())
}
