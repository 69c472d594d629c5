use crate::model::{ExtractedItem, Menu, MenuItem, MenuStatus};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For a file-backed SQLite URL, make sure the parent directory exists.
/// In-memory URLs and non-sqlite schemes pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }
    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let path_part = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = std::path::Path::new(path_part).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    url.to_string()
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn menu_from_row(row: &SqliteRow) -> Result<Menu> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    Ok(Menu {
        id: Uuid::parse_str(&id)?,
        status: MenuStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown menu status in store: {status}"))?,
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn item_from_row(row: &SqliteRow) -> Result<MenuItem> {
    let id: String = row.get("id");
    let menu_id: String = row.get("menu_id");
    Ok(MenuItem {
        id: Uuid::parse_str(&id)?,
        menu_id: Uuid::parse_str(&menu_id)?,
        item_text: row.get("item_text"),
        item_price: row.get("item_price"),
        description: row.get("description"),
        estimated_calories: row.get("estimated_calories"),
        generated_image: row.get("generated_image"),
        generation_prompt: row.get("generation_prompt"),
        created_at: row.get("created_at"),
    })
}

/// Persist a new menu job in `Pending` state and return its identifier.
#[instrument(skip_all)]
pub async fn create_menu(pool: &Pool, image: &[u8]) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO menus (id, status, original_image, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(MenuStatus::Pending.as_str())
    .bind(image)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn update_menu_status(
    pool: &Pool,
    menu_id: Uuid,
    status: MenuStatus,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE menus SET status = ?, error = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(menu_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert all extracted items for a job as one batch, inside a single
/// transaction. Returns the persisted rows with their assigned identifiers.
#[instrument(skip_all)]
pub async fn insert_items(
    pool: &Pool,
    menu_id: Uuid,
    extracted: &[ExtractedItem],
) -> Result<Vec<MenuItem>> {
    let mut tx = pool.begin().await?;
    let mut items = Vec::with_capacity(extracted.len());
    for e in extracted {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO menu_items (id, menu_id, item_text, item_price, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(menu_id.to_string())
        .bind(&e.item_text)
        .bind(&e.item_price)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        items.push(MenuItem {
            id,
            menu_id,
            item_text: e.item_text.clone(),
            item_price: e.item_price.clone(),
            description: None,
            estimated_calories: None,
            generated_image: None,
            generation_prompt: None,
            created_at: now,
        });
    }
    tx.commit().await?;
    Ok(items)
}

/// Write the whole enrichment field group for one item in a single statement.
/// Fields that failed to generate stay NULL; the prompt is always recorded.
#[instrument(skip_all)]
pub async fn update_item_enrichment(
    pool: &Pool,
    item_id: Uuid,
    description: Option<&str>,
    estimated_calories: Option<i64>,
    image: Option<&[u8]>,
    generation_prompt: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE menu_items SET description = ?, estimated_calories = ?, generated_image = ?, generation_prompt = ? WHERE id = ?",
    )
    .bind(description)
    .bind(estimated_calories)
    .bind(image)
    .bind(generation_prompt)
    .bind(item_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace only the generated image and its prompt, leaving the text
/// enrichment untouched. Used by single-item regeneration.
#[instrument(skip_all)]
pub async fn update_item_image(
    pool: &Pool,
    item_id: Uuid,
    image: Option<&[u8]>,
    generation_prompt: &str,
) -> Result<()> {
    sqlx::query("UPDATE menu_items SET generated_image = ?, generation_prompt = ? WHERE id = ?")
        .bind(image)
        .bind(generation_prompt)
        .bind(item_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_item(pool: &Pool, item_id: Uuid) -> Result<Option<MenuItem>> {
    let row = sqlx::query("SELECT * FROM menu_items WHERE id = ?")
        .bind(item_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(item_from_row).transpose()
}

/// Consistent snapshot of a job and all its items. Both reads run inside one
/// transaction so a concurrently enriching item can never appear half-written.
#[instrument(skip_all)]
pub async fn get_menu_with_items(pool: &Pool, menu_id: Uuid) -> Result<Option<(Menu, Vec<MenuItem>)>> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query("SELECT * FROM menus WHERE id = ?")
        .bind(menu_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let menu = menu_from_row(&row)?;
    let rows = sqlx::query("SELECT * FROM menu_items WHERE menu_id = ? ORDER BY created_at, id")
        .bind(menu_id.to_string())
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;
    let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Some((menu, items)))
}
