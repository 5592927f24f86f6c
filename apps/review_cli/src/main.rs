use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use review_core::{
    load_settings, DocumentStore, HttpDocumentStore, HttpTransport, NoopOverlay, ReviewSession,
    SessionEvent, StaticTokenProvider,
};
use shared::domain::IssueStatus;

#[derive(Parser, Debug)]
struct Args {
    /// Document to review, e.g. contract.pdf
    #[arg(long)]
    doc_id: Option<String>,
    /// List available documents and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = load_settings();

    let tokens = Arc::new(StaticTokenProvider::new(
        settings.auth_token.clone().unwrap_or_default(),
    ));
    let transport = Arc::new(HttpTransport::new(&settings.api_base_url, tokens)?);
    let documents = Arc::new(HttpDocumentStore::new(&settings.storage_base_url)?);

    if args.list {
        for file in documents.list().await? {
            println!("{}", file.name);
        }
        return Ok(());
    }
    let doc_id = args
        .doc_id
        .ok_or_else(|| anyhow!("--doc-id is required unless --list is given"))?;

    let session = ReviewSession::with_max_retries(
        transport,
        Arc::new(NoopOverlay::new()),
        documents,
        settings.max_stream_retries,
    );
    let mut events = session.subscribe_events();
    session.load_document(&doc_id).await?;
    session.start_check().await?;

    loop {
        match events.recv().await? {
            SessionEvent::IssuesAppended { count } => println!("received {count} issue(s)"),
            SessionEvent::CheckCompleted => break,
            SessionEvent::CheckFailed(message) => bail!("review check failed: {message}"),
            _ => {}
        }
    }

    let statuses: HashSet<IssueStatus> = IssueStatus::ALL.into_iter().collect();
    for issue in session.issues_view(&statuses, &HashSet::new()).await {
        let page = issue
            .page_num()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("[page {page:>3}] {:<24} {}", issue.kind, issue.text);
    }
    Ok(())
}
