//! Progress reporting.
//!
//! The scoreboard hands a fresh [`ScoreboardSnapshot`] to a [`Reporter`]
//! after every commit. [`TableReporter`] renders it as a grid table with a
//! `Round x/total` header, either one row per pairing or aggregated
//! standings per model.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::ScoreboardSnapshot;

/// Receives a consistent snapshot after each committed round.
///
/// Called from pairing tasks outside the scoreboard lock; implementations
/// must be cheap and must not block on the tournament.
pub trait Reporter: Send + Sync {
    fn report(&self, snapshot: &ScoreboardSnapshot);
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _snapshot: &ScoreboardSnapshot) {}
}

// ── View options ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportView {
    /// One row per pairing.
    #[default]
    Pairings,
    /// One row per model, summed across all its instances.
    Standings,
}

impl FromStr for ReportView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pairings" | "pairs" => Ok(Self::Pairings),
            "standings" | "leaderboard" => Ok(Self::Standings),
            other => Err(format!(
                "unknown view `{other}` (expected `pairings` or `standings`)"
            )),
        }
    }
}

impl std::fmt::Display for ReportView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pairings => write!(f, "pairings"),
            Self::Standings => write!(f, "standings"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Case-insensitive display name.
    #[default]
    Name,
    /// Highest score first, ties broken by name.
    Score,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "score" => Ok(Self::Score),
            other => Err(format!("unknown sort key `{other}` (expected `name` or `score`)")),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Score => write!(f, "score"),
        }
    }
}

// ── Standings ────────────────────────────────────────────────────────

/// Aggregate result for one model across every pairing it played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub model: String,
    pub display_name: String,
    pub score: i64,
    pub rounds: u64,
    pub pairings: usize,
}

/// Sum each model's instance scores over the snapshot.
///
/// In a self-pair both instances belong to the same model, so both scores
/// count towards it while the pairing's rounds count once.
pub fn standings(snapshot: &ScoreboardSnapshot, sort: SortKey) -> Vec<Standing> {
    let mut by_model: BTreeMap<&str, Standing> = BTreeMap::new();
    for row in &snapshot.rows {
        let sides = [(&row.first, row.first_score), (&row.second, row.second_score)];
        for (idx, (competitor, score)) in sides.into_iter().enumerate() {
            let entry = by_model
                .entry(competitor.name.as_str())
                .or_insert_with(|| Standing {
                    model: competitor.name.clone(),
                    display_name: competitor.display_name.clone(),
                    score: 0,
                    rounds: 0,
                    pairings: 0,
                });
            entry.score += score;
            if idx == 0 || !row.pairing.is_self_pair() {
                entry.rounds += u64::from(row.rounds);
                entry.pairings += 1;
            }
        }
    }

    let mut out: Vec<Standing> = by_model.into_values().collect();
    let name_key = |s: &Standing| (s.display_name.to_lowercase(), s.model.clone());
    match sort {
        SortKey::Name => out.sort_by_key(name_key),
        SortKey::Score => {
            out.sort_by(|x, y| y.score.cmp(&x.score).then(name_key(x).cmp(&name_key(y))))
        }
    }
    out
}

// ── Rendering ────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

/// Grid table: `+---+` rules, `=` under the header, padded cells.
fn render_grid(headers: &[&str], align: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let rule = |fill: char| {
        let mut line = String::from("+");
        for w in &widths {
            line.extend(std::iter::repeat(fill).take(w + 2));
            line.push('+');
        }
        line
    };
    let line = |cells: &[String]| {
        let mut out = String::from("|");
        for ((cell, &w), a) in cells.iter().zip(&widths).zip(align) {
            let cell = match a {
                Align::Left => format!(" {cell:<w$} "),
                Align::Right => format!(" {cell:>w$} "),
            };
            out.push_str(&cell);
            out.push('|');
        }
        out
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut out = vec![rule('-'), line(&header_cells), rule('=')];
    for row in rows {
        out.push(line(row));
        out.push(rule('-'));
    }
    if rows.is_empty() {
        out.pop();
        out.push(rule('-'));
    }
    out.join("\n")
}

fn pairing_rows(snapshot: &ScoreboardSnapshot, sort: SortKey) -> Vec<Vec<String>> {
    let mut rows: Vec<_> = snapshot.rows.iter().collect();
    let name_key = |r: &&crate::state::PairingRow| {
        (
            r.first.display_name.to_lowercase(),
            r.second.display_name.to_lowercase(),
            r.pairing,
        )
    };
    match sort {
        SortKey::Name => rows.sort_by_key(name_key),
        SortKey::Score => rows.sort_by(|x, y| {
            (y.first_score + y.second_score)
                .cmp(&(x.first_score + x.second_score))
                .then(name_key(x).cmp(&name_key(y)))
        }),
    }
    rows.into_iter()
        .map(|r| {
            vec![
                r.first.display_name.clone(),
                r.second.display_name.clone(),
                r.first_score.to_string(),
                r.second_score.to_string(),
                r.rounds.to_string(),
            ]
        })
        .collect()
}

/// Header line plus grid for `snapshot` in the chosen view and order.
pub fn render(snapshot: &ScoreboardSnapshot, view: ReportView, sort: SortKey) -> String {
    let header = format!(
        "Round {}/{}",
        snapshot.rounds_completed, snapshot.rounds_total
    );
    let table = match view {
        ReportView::Pairings => render_grid(
            &["Player A", "Player B", "A's Score", "B's Score", "Rounds Played"],
            &[Align::Left, Align::Left, Align::Right, Align::Right, Align::Right],
            &pairing_rows(snapshot, sort),
        ),
        ReportView::Standings => {
            let rows: Vec<Vec<String>> = standings(snapshot, sort)
                .into_iter()
                .map(|s| {
                    vec![
                        s.display_name,
                        s.score.to_string(),
                        s.rounds.to_string(),
                        s.pairings.to_string(),
                    ]
                })
                .collect();
            render_grid(
                &["Model", "Score", "Rounds Played", "Pairings"],
                &[Align::Left, Align::Right, Align::Right, Align::Right],
                &rows,
            )
        }
    };
    format!("{header}\n{table}")
}

/// Prints the rendered table to stdout after every commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableReporter {
    view: ReportView,
    sort: SortKey,
}

impl TableReporter {
    pub fn new(view: ReportView, sort: SortKey) -> Self {
        Self { view, sort }
    }
}

impl Reporter for TableReporter {
    fn report(&self, snapshot: &ScoreboardSnapshot) {
        let table = render(snapshot, self.view, self.sort);
        // One println per table so concurrent reports never interleave lines.
        println!("{table}\n");
        debug!(
            rounds_completed = snapshot.rounds_completed,
            rounds_total = snapshot.rounds_total,
            "Scoreboard updated"
        );
    }
}
