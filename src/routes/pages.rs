use axum::{extract::State, response::Html};
use std::sync::Arc;
use tera::Context;

use crate::state::AppState;

pub async fn student(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut ctx = Context::new();
    ctx.insert("poll_interval_ms", &(state.schedule.retry_after_secs() * 1000));
    render_template("student.html", ctx)
}

pub async fn teacher(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut ctx = Context::new();
    ctx.insert("poll_interval_ms", &(state.schedule.retry_after_secs() * 1000));
    render_template("teacher.html", ctx)
}

fn render_template(name: &str, ctx: Context) -> Html<String> {
    let tera = crate::templates::get_tera();
    let rendered = tera.render(name, &ctx).unwrap_or_else(|e| {
        tracing::error!("Failed to render {}: {}", name, e);
        format!("Template error: {}", name)
    });
    Html(rendered)
}
