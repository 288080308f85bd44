use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::forecast::MonthWindow;
use crate::models::{AgentDayRow, Category, DayRow, TargetRow, TopError};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const GROUP_DAY_COLUMNS: &str = "SELECT center, service, channel, category, evaluated_at, \
     SUM(error_count)::float8 AS error_sum, \
     SUM(max_score)::float8 AS score_sum, \
     COUNT(*) AS eval_count \
     FROM quality_early_warning.evaluations";

/// Per-day aggregates for every group dimension in the requested month.
///
/// The primary query carries the date-range predicate (and the optional
/// center filter). If its shape is rejected, a simpler month-equality query
/// runs instead; if that also fails the month resolves to an empty row set.
/// Warehouse trouble degrades the dashboard, it never breaks it.
pub async fn fetch_group_day_rows(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
) -> Vec<DayRow> {
    match group_day_rows_ranged(pool, window, center).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(%error, month = %window.label(), "ranged group query failed, retrying with month-equality shape");
            match group_day_rows_by_month(pool, window, center).await {
                Ok(rows) => rows,
                Err(error) => {
                    tracing::warn!(%error, month = %window.label(), "fallback group query failed, defaulting to empty result set");
                    Vec::new()
                }
            }
        }
    }
}

async fn group_day_rows_ranged(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
) -> anyhow::Result<Vec<DayRow>> {
    let mut query = format!(
        "{GROUP_DAY_COLUMNS} WHERE evaluated_at >= $1 AND evaluated_at <= $2"
    );
    if center.is_some() {
        query.push_str(" AND center = $3");
    }
    query.push_str(" GROUP BY center, service, channel, category, evaluated_at ORDER BY evaluated_at");

    let mut rows = sqlx::query(&query).bind(window.first_day).bind(window.last_day);
    if let Some(value) = center {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("ranged group aggregate query failed")?;
    Ok(collect_group_rows(records))
}

async fn group_day_rows_by_month(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
) -> anyhow::Result<Vec<DayRow>> {
    let query = format!(
        "{GROUP_DAY_COLUMNS} WHERE to_char(evaluated_at, 'YYYY-MM') = $1 \
         GROUP BY center, service, channel, category, evaluated_at ORDER BY evaluated_at"
    );

    let records = sqlx::query(&query)
        .bind(window.label())
        .fetch_all(pool)
        .await
        .context("month-equality group aggregate query failed")?;

    let mut rows = collect_group_rows(records);
    if let Some(center) = center {
        rows.retain(|row| row.center == center);
    }
    Ok(rows)
}

fn collect_group_rows(records: Vec<sqlx::postgres::PgRow>) -> Vec<DayRow> {
    let mut rows = Vec::new();
    for record in records {
        let category: String = record.get("category");
        let Some(category) = Category::parse(&category) else {
            continue;
        };
        rows.push(DayRow {
            center: record.get("center"),
            service: record.get("service"),
            channel: record.get("channel"),
            category,
            date: record.get("evaluated_at"),
            error_sum: record.get("error_sum"),
            score_sum: record.get("score_sum"),
            eval_count: record.get("eval_count"),
        });
    }
    rows
}

const AGENT_DAY_COLUMNS: &str = "SELECT agent_id, agent_name, center, team, category, evaluated_at, \
     SUM(error_count)::float8 AS error_sum, \
     SUM(max_score)::float8 AS score_sum, \
     COUNT(*) AS eval_count \
     FROM quality_early_warning.evaluations";

/// Per-day aggregates keyed by agent, same fallback ladder as the group
/// query. `center` and `agent` filters are mutually exclusive at the CLI.
pub async fn fetch_agent_day_rows(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
    agent: Option<&str>,
) -> Vec<AgentDayRow> {
    match agent_day_rows_ranged(pool, window, center, agent).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(%error, month = %window.label(), "ranged agent query failed, retrying with month-equality shape");
            match agent_day_rows_by_month(pool, window, center, agent).await {
                Ok(rows) => rows,
                Err(error) => {
                    tracing::warn!(%error, month = %window.label(), "fallback agent query failed, defaulting to empty result set");
                    Vec::new()
                }
            }
        }
    }
}

async fn agent_day_rows_ranged(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
    agent: Option<&str>,
) -> anyhow::Result<Vec<AgentDayRow>> {
    let mut query = format!(
        "{AGENT_DAY_COLUMNS} WHERE evaluated_at >= $1 AND evaluated_at <= $2"
    );
    if center.is_some() {
        query.push_str(" AND center = $3");
    } else if agent.is_some() {
        query.push_str(" AND agent_id = $3");
    }
    query.push_str(
        " GROUP BY agent_id, agent_name, center, team, category, evaluated_at ORDER BY evaluated_at",
    );

    let mut rows = sqlx::query(&query).bind(window.first_day).bind(window.last_day);
    if let Some(value) = center {
        rows = rows.bind(value);
    } else if let Some(value) = agent {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("ranged agent aggregate query failed")?;
    Ok(collect_agent_rows(records))
}

async fn agent_day_rows_by_month(
    pool: &PgPool,
    window: &MonthWindow,
    center: Option<&str>,
    agent: Option<&str>,
) -> anyhow::Result<Vec<AgentDayRow>> {
    let query = format!(
        "{AGENT_DAY_COLUMNS} WHERE to_char(evaluated_at, 'YYYY-MM') = $1 \
         GROUP BY agent_id, agent_name, center, team, category, evaluated_at ORDER BY evaluated_at"
    );

    let records = sqlx::query(&query)
        .bind(window.label())
        .fetch_all(pool)
        .await
        .context("month-equality agent aggregate query failed")?;

    let mut rows = collect_agent_rows(records);
    if let Some(center) = center {
        rows.retain(|row| row.center == center);
    } else if let Some(agent) = agent {
        rows.retain(|row| row.agent_id == agent);
    }
    Ok(rows)
}

fn collect_agent_rows(records: Vec<sqlx::postgres::PgRow>) -> Vec<AgentDayRow> {
    let mut rows = Vec::new();
    for record in records {
        let category: String = record.get("category");
        let Some(category) = Category::parse(&category) else {
            continue;
        };
        rows.push(AgentDayRow {
            agent_id: record.get("agent_id"),
            agent_name: record.get("agent_name"),
            center: record.get("center"),
            team: record.get("team"),
            category,
            date: record.get("evaluated_at"),
            error_sum: record.get("error_sum"),
            score_sum: record.get("score_sum"),
            eval_count: record.get("eval_count"),
        });
    }
    rows
}

/// Ranked error items per agent for the month, top three each. Consumed
/// as-is by the prediction records; a failed query just drops the section.
pub async fn fetch_agent_top_errors(
    pool: &PgPool,
    window: &MonthWindow,
) -> HashMap<String, Vec<TopError>> {
    let query = "SELECT agent_id, error_item, \
         COUNT(*) AS item_count, \
         SUM(error_count)::float8 / NULLIF(SUM(max_score), 0)::float8 * 100 AS item_rate \
         FROM quality_early_warning.evaluations \
         WHERE evaluated_at >= $1 AND evaluated_at <= $2 \
           AND error_item IS NOT NULL AND error_count > 0 \
         GROUP BY agent_id, error_item \
         ORDER BY agent_id, item_count DESC";

    let records = match sqlx::query(query)
        .bind(window.first_day)
        .bind(window.last_day)
        .fetch_all(pool)
        .await
    {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(%error, month = %window.label(), "top-error query failed, omitting error rankings");
            return HashMap::new();
        }
    };

    let mut by_agent: HashMap<String, Vec<TopError>> = HashMap::new();
    for record in records {
        let agent_id: String = record.get("agent_id");
        let entry = by_agent.entry(agent_id).or_default();
        if entry.len() >= 3 {
            continue;
        }
        let count: i64 = record.get("item_count");
        let rate: Option<f64> = record.get("item_rate");
        entry.push(TopError {
            name: record.get("error_item"),
            count: count.max(0) as u32,
            rate: rate.unwrap_or(0.0),
        });
    }
    by_agent
}

/// Active target rows. A failed lookup degrades to the configured defaults
/// rather than failing the request.
pub async fn fetch_targets(pool: &PgPool) -> Vec<TargetRow> {
    let query = "SELECT center, category, target_rate \
         FROM quality_early_warning.targets WHERE active";

    let records = match sqlx::query(query).fetch_all(pool).await {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(%error, "target query failed, using configured defaults");
            return Vec::new();
        }
    };

    let mut targets = Vec::new();
    for record in records {
        let category: String = record.get("category");
        let Some(category) = Category::parse(&category) else {
            continue;
        };
        targets.push(TargetRow {
            center: record.get("center"),
            category,
            target_rate: record.get("target_rate"),
        });
    }
    targets
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let targets = vec![
        ("A", "attitude", 3.3),
        ("A", "ops", 3.9),
        ("B", "attitude", 2.7),
        ("B", "ops", 1.7),
    ];

    for (center, category, rate) in targets {
        sqlx::query(
            r#"
            INSERT INTO quality_early_warning.targets (id, center, category, target_rate, active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (center, category) DO UPDATE
            SET target_rate = EXCLUDED.target_rate, active = TRUE
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(center)
        .bind(category)
        .bind(rate)
        .execute(pool)
        .await?;
    }

    // One sample month (July 2026): two group dimensions in center A, one in
    // center B, three agents, three weeks of history.
    let evaluations: Vec<(&str, &str, &str, &str, &str, &str, &str, &str, i32, i32, Option<&str>, u32)> = vec![
        ("seed-001", "A", "billing", "phone", "A-1042", "김하늘", "1팀", "attitude", 2, 100, Some("불친절 응대"), 2),
        ("seed-002", "A", "billing", "phone", "A-1042", "김하늘", "1팀", "ops", 3, 100, Some("요금 안내 오류"), 2),
        ("seed-003", "A", "billing", "phone", "A-1042", "김하늘", "1팀", "attitude", 3, 100, Some("불친절 응대"), 9),
        ("seed-004", "A", "billing", "phone", "A-1042", "김하늘", "1팀", "ops", 4, 100, Some("요금 안내 오류"), 9),
        ("seed-005", "A", "billing", "phone", "A-1077", "이서준", "1팀", "attitude", 4, 100, Some("공감 표현 누락"), 16),
        ("seed-006", "A", "billing", "phone", "A-1077", "이서준", "1팀", "ops", 5, 100, Some("전산 처리 누락"), 16),
        ("seed-007", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "attitude", 1, 100, None, 3),
        ("seed-008", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "ops", 2, 100, Some("상담 이력 미기록"), 3),
        ("seed-009", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "attitude", 1, 100, None, 11),
        ("seed-010", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "ops", 2, 100, Some("상담 이력 미기록"), 11),
        ("seed-011", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "attitude", 1, 100, None, 18),
        ("seed-012", "A", "tech-support", "chat", "A-1077", "이서준", "2팀", "ops", 1, 100, None, 18),
        ("seed-013", "B", "billing", "chat", "B-2011", "박지우", "3팀", "attitude", 6, 100, Some("고객 말 끊기"), 4),
        ("seed-014", "B", "billing", "chat", "B-2011", "박지우", "3팀", "ops", 7, 100, Some("본인 확인 누락"), 4),
        ("seed-015", "B", "billing", "chat", "B-2011", "박지우", "3팀", "attitude", 7, 100, Some("고객 말 끊기"), 10),
        ("seed-016", "B", "billing", "chat", "B-2011", "박지우", "3팀", "ops", 8, 100, Some("본인 확인 누락"), 10),
        ("seed-017", "B", "billing", "chat", "B-2011", "박지우", "3팀", "attitude", 8, 100, Some("고객 말 끊기"), 17),
        ("seed-018", "B", "billing", "chat", "B-2011", "박지우", "3팀", "ops", 9, 100, Some("본인 확인 누락"), 17),
    ];

    for (source_key, center, service, channel, agent_id, agent_name, team, category, error_count, max_score, error_item, day) in evaluations {
        let evaluated_at =
            NaiveDate::from_ymd_opt(2026, 7, day).context("invalid seed date")?;
        sqlx::query(
            r#"
            INSERT INTO quality_early_warning.evaluations
            (id, center, service, channel, agent_id, agent_name, team, category,
             error_count, max_score, error_item, evaluated_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(center)
        .bind(service)
        .bind(channel)
        .bind(agent_id)
        .bind(agent_name)
        .bind(team)
        .bind(category)
        .bind(error_count)
        .bind(max_score)
        .bind(error_item)
        .bind(evaluated_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        center: String,
        service: String,
        channel: String,
        agent_id: String,
        agent_name: String,
        team: String,
        category: String,
        error_count: i32,
        max_score: i32,
        error_item: Option<String>,
        evaluated_at: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if Category::parse(&row.category).is_none() {
            anyhow::bail!(
                "unknown category '{}' for source {:?}",
                row.category,
                row.source_key
            );
        }

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO quality_early_warning.evaluations
            (id, center, service, channel, agent_id, agent_name, team, category,
             error_count, max_score, error_item, evaluated_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.center)
        .bind(&row.service)
        .bind(&row.channel)
        .bind(&row.agent_id)
        .bind(&row.agent_name)
        .bind(&row.team)
        .bind(&row.category)
        .bind(row.error_count)
        .bind(row.max_score)
        .bind(&row.error_item)
        .bind(row.evaluated_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
