//! The asynchronous processing pipeline: extraction, per-item enrichment,
//! and the job state machine that ties them together.
//!
//! One call to [`process_menu`] drives a job from `Pending` to a terminal
//! state. Extraction failures fail the whole job; enrichment failures are
//! swallowed per item so the job still completes with whatever succeeded.

use crate::ai::{self, AiError, AiService};
use crate::db::{self, Pool};
use crate::model::{ExtractedItem, MenuItem, MenuStatus};
use anyhow::Result;
use futures::StreamExt;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no menu items found in the image")]
    NoItemsFound,
    #[error("failed to extract menu items: {0}")]
    Adapter(#[from] AiError),
    #[error("failed to save menu items: {0}")]
    Store(String),
}

/// What one item's enrichment produced. Each field is an independent failure
/// domain; the prompt is kept even when every generation call failed.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub description: Option<String>,
    pub estimated_calories: Option<i64>,
    pub image: Option<Vec<u8>>,
    pub prompt: String,
}

/// Drive one job to a terminal state. Never retries; a store-level failure
/// aborts processing and is surfaced to the worker for logging.
#[instrument(skip_all, fields(menu_id = %menu_id))]
pub async fn process_menu(
    pool: &Pool,
    ai: &dyn AiService,
    menu_id: Uuid,
    image: &[u8],
    enrich_concurrency: usize,
) -> Result<()> {
    info!("starting menu processing");
    db::update_menu_status(pool, menu_id, MenuStatus::Extracting, None).await?;

    let items = match run_extraction(pool, ai, menu_id, image).await {
        Ok(items) => items,
        Err(err) => {
            warn!(%err, "extraction failed");
            db::update_menu_status(pool, menu_id, MenuStatus::Failed, Some(&err.to_string()))
                .await?;
            return Ok(());
        }
    };

    db::update_menu_status(pool, menu_id, MenuStatus::Enriching, None).await?;
    enrich_items(pool, ai, &items, enrich_concurrency).await;

    db::update_menu_status(pool, menu_id, MenuStatus::Completed, None).await?;
    info!(items = items.len(), "menu processing completed");
    Ok(())
}

/// Extraction stage: one vision call, blank lines dropped, one batch insert.
async fn run_extraction(
    pool: &Pool,
    ai: &dyn AiService,
    menu_id: Uuid,
    image: &[u8],
) -> Result<Vec<MenuItem>, ExtractionError> {
    let extracted = ai.extract_items(image).await?;
    let usable = usable_items(extracted);
    if usable.is_empty() {
        return Err(ExtractionError::NoItemsFound);
    }
    let items = db::insert_items(pool, menu_id, &usable)
        .await
        .map_err(|e| ExtractionError::Store(e.to_string()))?;
    Ok(items)
}

/// Drop items whose extracted text is empty or whitespace-only.
fn usable_items(extracted: Vec<ExtractedItem>) -> Vec<ExtractedItem> {
    extracted
        .into_iter()
        .filter(|item| !item.item_text.trim().is_empty())
        .collect()
}

/// Enrichment stage: all items of the job fan out concurrently, bounded by
/// `concurrency`. Every item is attempted regardless of sibling outcomes.
async fn enrich_items(pool: &Pool, ai: &dyn AiService, items: &[MenuItem], concurrency: usize) {
    futures::stream::iter(items)
        .for_each_concurrent(concurrency.max(1), |item| async move {
            let outcome = enrich_one(ai, item).await;
            if let Err(err) = db::update_item_enrichment(
                pool,
                item.id,
                outcome.description.as_deref(),
                outcome.estimated_calories,
                outcome.image.as_deref(),
                &outcome.prompt,
            )
            .await
            {
                warn!(%err, item_id = %item.id, "failed to persist enrichment");
            }
        })
        .await;
}

/// Enrich a single item. Both generation calls are launched together and both
/// are awaited; either may fail without affecting the other.
async fn enrich_one(ai: &dyn AiService, item: &MenuItem) -> EnrichmentOutcome {
    let text_prompt = ai::description_prompt(&item.item_text);
    let image_prompt = ai::image_prompt(&item.item_text);

    let (text, image) = futures::join!(
        ai.generate_text(&text_prompt),
        ai.generate_image(&image_prompt)
    );

    let (description, estimated_calories) = match text {
        Ok(gen) => (Some(gen.description), Some(gen.estimated_calories)),
        Err(err) => {
            warn!(%err, item_id = %item.id, "description generation failed");
            (None, None)
        }
    };
    let image = match image {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(%err, item_id = %item.id, "image generation failed");
            None
        }
    };

    EnrichmentOutcome {
        description,
        estimated_calories,
        image,
        prompt: image_prompt,
    }
}

/// Re-run image generation for a single already-extracted item. Not part of
/// the job state machine; the job's status is left untouched. On generation
/// failure the stored image and prompt are kept as they were.
#[instrument(skip_all, fields(item_id = %item_id))]
pub async fn regenerate_item_image(pool: &Pool, ai: &dyn AiService, item_id: Uuid) -> Result<bool> {
    let Some(item) = db::get_item(pool, item_id).await? else {
        return Ok(false);
    };
    let prompt = ai::image_prompt(&item.item_text);
    match ai.generate_image(&prompt).await {
        Ok(bytes) => {
            db::update_item_image(pool, item_id, Some(&bytes), &prompt).await?;
            info!("regenerated item image");
        }
        Err(err) => {
            warn!(%err, "image regeneration failed");
        }
    }
    Ok(true)
}
