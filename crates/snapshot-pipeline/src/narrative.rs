//! Generate phase: AI-written text layered on top of the raw snapshot.
//!
//! Each step is independent. A generation failure only replaces that step's
//! field with a placeholder; fetched data is never modified.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Weekday};
use chrono_tz::Tz;
use market_core::{
    sanitize, ColumnSection, EquityIndex, MarketSnapshot, NewsDigest, PerformanceWindow, SectorAggregate,
    WeeklyReport,
};
use text_generation::{GenerationRequest, TextGenerator};

use crate::artifacts::ArtifactStore;
use crate::error::{ArtifactError, SnapshotError};
use crate::heatmap::sector_aggregates;

pub const COMMENTARY_ERROR: &str = "AI解説の生成中にエラーが発生しました。";
pub const COMMENTARY_MISSING: &str = "AI解説の生成に失敗しました。";
pub const NEWS_UNAVAILABLE: &str = "ニュースが取得できなかったため、AIによる分析は行えませんでした。";
pub const NEWS_FAILED: &str = "AIによるニュースの分析に失敗しました。";
pub const COLUMN_MISSING: &str = "週次コラムの生成に失敗しました。";
pub const WEEKLY_COLUMN_TITLE: &str = "今週の注目ポイント (AIコラム)";

const RESPONSE_KEY: &str = "response";
const NO_DATA: &str = "データなし";

const MARKET_COMMENTARY_TOKENS: u32 = 250;
const NEWS_DIGEST_TOKENS: u32 = 1024;
const HEATMAP_COMMENTARY_TOKENS: u32 = 500;
const WEEKLY_COLUMN_TOKENS: u32 = 500;

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn market_prompt(snapshot: &MarketSnapshot) -> String {
    let market = &snapshot.market;
    let reading = market.fear_and_greed.reading();
    format!(
        "以下の市場データを基に、日本の個人投資家向けに本日の米国市場の状況を150字程度で簡潔に解説してください。\n\
         - VIX指数: {}\n\
         - 米国10年債先物: {}\n\
         - Fear & Greed Index: {} ({})\n\n\
         次のJSON形式で出力してください:\n{{\"response\": \"解説\"}}",
        or_na(market.vix.current),
        or_na(market.t_note_future.current),
        or_na(reading.map(|r| r.now)),
        reading.map(|r| r.category.label()).unwrap_or("N/A"),
    )
}

fn news_prompt(snapshot: &MarketSnapshot) -> String {
    let articles: String = snapshot
        .news_raw
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let summary = if item.summary.is_empty() { "N/A" } else { item.summary.as_str() };
            format!("記事{}: {}\n概要: {}\n\n", i + 1, item.title, summary)
        })
        .collect();

    format!(
        "以下の米国市場に関するニュース記事を分析し、日本の個人投資家向けに要約してください。\n\n\
         ニュース記事:\n---\n{}---\n\n\
         記事全体から今日の市場のムードが伝わるよう、事実と解釈を交えた「今朝の3行サマリー」を作成してください。\n\
         さらに最も重要な「主要トピック」を3つ選び、それぞれ次の項目を記述してください。\n\
         - fact: ニュースで報道された客観的な事実\n\
         - interpretation: その事実が市場でどう受け止められているか\n\
         - impact: S&P 500やNASDAQへの短期的な影響\n\n\
         次のJSON形式で厳密に出力してください:\n\
         {{\"summary\": \"3行のサマリー\", \"topics\": [{{\"title\": \"15文字以内のタイトル\", \"fact\": \"...\", \"interpretation\": \"...\", \"impact\": \"...\"}}]}}",
        articles
    )
}

fn sector_line(sectors: &[SectorAggregate], best: bool) -> String {
    if sectors.is_empty() {
        return NO_DATA.to_string();
    }
    let picked: Vec<&SectorAggregate> = if best {
        sectors.iter().take(3).collect()
    } else {
        sectors[sectors.len().saturating_sub(3)..].iter().collect()
    };
    picked
        .iter()
        .map(|s| format!("{} ({:.2}%)", s.sector, s.performance))
        .collect::<Vec<_>>()
        .join(", ")
}

fn heatmap_prompt(index: EquityIndex, windows: &[(PerformanceWindow, Vec<SectorAggregate>)]) -> String {
    let label = |w: PerformanceWindow| match w {
        PerformanceWindow::OneDay => "1日間",
        PerformanceWindow::OneWeek => "1週間",
        PerformanceWindow::OneMonth => "1ヶ月間",
    };
    let mut data = String::new();
    for best in [true, false] {
        for (window, sectors) in windows {
            data.push_str(&format!(
                "- {}パフォーマンス ({}3セクター): {}\n",
                label(*window),
                if best { "上位" } else { "下位" },
                sector_line(sectors, best)
            ));
        }
    }

    format!(
        "以下の{}に関する1日、1週間、1ヶ月のセクター別パフォーマンスを分析してください。\n\n\
         # データ\n{}\n\
         # 指示\n\
         1. 短期(1日): 今日特に強かったセクターと弱かったセクター\n\
         2. 中期(1週間): 勢いを増している、または失っているセクター\n\
         3. 長期(1ヶ月)との比較: 短期・中期の動きは長期トレンドの継続か転換か\n\
         全体で200字程度にまとめてください。\n\n\
         次のJSON形式で出力してください:\n{{\"response\": \"解説\"}}",
        index.display_name(),
        data
    )
}

fn column_prompt(snapshot: &MarketSnapshot) -> String {
    let reading = snapshot.market.fear_and_greed.reading();
    let indicators: Vec<String> = snapshot
        .indicators
        .economic
        .iter()
        .take(5)
        .map(|e| format!("{} {}", e.datetime, e.name.as_deref().unwrap_or("--")))
        .collect();

    format!(
        "今週の米国市場の展望について、日本の個人投資家向けに300字程度のコラムを執筆してください。\n\
         先週の市場を振り返り、今週の注目点を盛り込んでください。\n\n\
         参考データ:\n\
         - VIX指数: {}\n\
         - 米国10年債先物: {}\n\
         - Fear & Greed Index: 現在値 {}, 1週間前 {}\n\
         - 今週の主な経済指標: {}\n\n\
         次のJSON形式で出力してください:\n{{\"response\": \"コラム\"}}",
        or_na(snapshot.market.vix.current),
        or_na(snapshot.market.t_note_future.current),
        or_na(reading.map(|r| r.now)),
        or_na(reading.and_then(|r| r.prev_week)),
        if indicators.is_empty() {
            NO_DATA.to_string()
        } else {
            indicators.join(" / ")
        }
    )
}

pub struct NarrativePhase {
    generator: Arc<dyn TextGenerator>,
}

impl NarrativePhase {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Fill every narrative field, then stamp `date` and `last_updated`.
    pub async fn enrich(&self, snapshot: &mut MarketSnapshot, now: DateTime<Tz>) {
        tracing::info!("Generating narrative with the {} backend", self.generator.backend_name());
        self.market_commentary(snapshot).await;
        self.news_digest(snapshot).await;
        self.heatmap_commentary(snapshot).await;
        self.weekly_column(snapshot, now).await;

        snapshot.date = Some(now.format("%Y-%m-%d").to_string());
        snapshot.last_updated = Some(now.to_rfc3339());
    }

    /// `response` field of a JSON answer, or `missing` when the key is absent.
    async fn respond(&self, prompt: String, max_tokens: u32, missing: &str) -> Result<String, String> {
        match self.generator.generate(GenerationRequest::json(prompt, max_tokens)).await {
            Ok(generated) => Ok(generated.field(RESPONSE_KEY).unwrap_or(missing).to_string()),
            Err(e) => Err(e.coded_message()),
        }
    }

    pub async fn market_commentary(&self, snapshot: &mut MarketSnapshot) {
        tracing::info!("Generating AI commentary...");
        let text = match self
            .respond(market_prompt(snapshot), MARKET_COMMENTARY_TOKENS, COMMENTARY_MISSING)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to generate AI commentary: {}", e);
                COMMENTARY_ERROR.to_string()
            }
        };
        snapshot.market.ai_commentary = Some(text);
    }

    pub async fn news_digest(&self, snapshot: &mut MarketSnapshot) {
        tracing::info!("Generating AI news analysis...");
        if snapshot.news_raw.is_empty() {
            tracing::warn!("No raw news available to generate AI news.");
            snapshot.news = NewsDigest {
                summary: NEWS_UNAVAILABLE.to_string(),
                ..Default::default()
            };
            return;
        }

        let request = GenerationRequest::json(news_prompt(snapshot), NEWS_DIGEST_TOKENS);
        let parsed = match self.generator.generate(request).await {
            Ok(generated) => generated
                .into_json()
                .and_then(|value| serde_json::from_value::<NewsDigest>(value).map_err(Into::into))
                .map_err(|e| e.coded_message()),
            Err(e) => Err(e.coded_message()),
        };

        snapshot.news = match parsed {
            Ok(digest) if digest.error.is_none() && !digest.summary.is_empty() => digest,
            Ok(digest) => NewsDigest {
                summary: NEWS_FAILED.to_string(),
                topics: Vec::new(),
                error: Some(digest.error.unwrap_or_else(|| "empty summary".to_string())),
            },
            Err(e) => {
                tracing::error!("Could not generate AI news: {}", e);
                NewsDigest {
                    summary: NEWS_FAILED.to_string(),
                    topics: Vec::new(),
                    error: Some(e),
                }
            }
        };
    }

    /// Stored on the 1-day compatibility copy of each universe.
    pub async fn heatmap_commentary(&self, snapshot: &mut MarketSnapshot) {
        tracing::info!("Generating heatmap AI commentary...");
        for index in EquityIndex::ALL {
            let windows: Vec<(PerformanceWindow, Vec<SectorAggregate>)> = PerformanceWindow::ALL
                .into_iter()
                .map(|w| {
                    let sectors = snapshot
                        .heatmap(index, Some(w))
                        .map(|h| sector_aggregates(&h.stocks))
                        .unwrap_or_default();
                    (w, sectors)
                })
                .collect();

            if windows[0].1.is_empty() {
                tracing::warn!("No 1-day data for {}, skipping AI commentary.", index.key());
                continue;
            }

            let text = match self
                .respond(heatmap_prompt(index, &windows), HEATMAP_COMMENTARY_TOKENS, COMMENTARY_MISSING)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to generate AI commentary for {}: {}", index.key(), e);
                    COMMENTARY_ERROR.to_string()
                }
            };
            snapshot.heatmap_mut(index, None).ai_commentary = Some(text);
        }
    }

    /// Written on Mondays in the reference zone; cleared on other days.
    pub async fn weekly_column(&self, snapshot: &mut MarketSnapshot, now: DateTime<Tz>) {
        if now.weekday() != Weekday::Mon {
            snapshot.column = ColumnSection::default();
            return;
        }

        tracing::info!("Generating weekly column...");
        snapshot.column = match self
            .respond(column_prompt(snapshot), WEEKLY_COLUMN_TOKENS, COLUMN_MISSING)
            .await
        {
            Ok(content) => ColumnSection {
                weekly_report: Some(WeeklyReport {
                    title: WEEKLY_COLUMN_TITLE.to_string(),
                    content,
                    date: now.format("%Y-%m-%d").to_string(),
                }),
            },
            Err(e) => {
                tracing::error!("Failed to generate weekly column: {}", e);
                ColumnSection::default()
            }
        };
    }
}

/// Read the raw snapshot, add the narrative, publish, then apply retention.
pub async fn run_generate(
    artifacts: &ArtifactStore,
    phase: &NarrativePhase,
    now: DateTime<Tz>,
) -> Result<(MarketSnapshot, PathBuf), SnapshotError> {
    tracing::info!("--- Starting Report Generation ---");
    let mut snapshot = artifacts.read_raw()?;

    phase.enrich(&mut snapshot, now).await;

    let clean = sanitize(&snapshot).map_err(ArtifactError::from)?;
    let path = artifacts.publish(&clean, now.date_naive())?;
    tracing::info!("--- Report Generation Completed. Saved to {} ---", path.display());

    let cleanup = artifacts.cleanup(now.date_naive());
    if !cleanup.failed.is_empty() {
        tracing::warn!("{} old data files could not be deleted", cleanup.failed.len());
    }
    Ok((snapshot, path))
}
