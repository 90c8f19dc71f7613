//! Human-like page interaction
//!
//! Plans (pointer paths, scroll steps, reading pauses) are pure functions of
//! an RNG so they can be tested; `HumanBehavior` plays them against a page.

use crate::browser::{BrowserResult, Page, Viewport};
use crate::config::StealthConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Steps in one pointer movement
pub const PATH_STEPS: usize = 20;

/// Longest reading pause
pub const MAX_READING_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Cubic Bezier path from `start` to `end` with jittered control points
///
/// Returns `steps + 1` points, both endpoints included.
pub fn mouse_path<R: Rng + ?Sized>(start: Point, end: Point, steps: usize, rng: &mut R) -> Vec<Point> {
    let mut wobble = |base: f64, delta: f64, share: f64| {
        base + delta * share + (rng.gen::<f64>() - 0.5) * 100.0
    };

    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let c1 = Point {
        x: wobble(start.x, dx, 0.25),
        y: wobble(start.y, dy, 0.25),
    };
    let c2 = Point {
        x: wobble(start.x, dx, 0.75),
        y: wobble(start.y, dy, 0.75),
    };

    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps.max(1) as f64;
            let mt = 1.0 - t;
            let x = mt.powi(3) * start.x
                + 3.0 * mt * mt * t * c1.x
                + 3.0 * mt * t * t * c2.x
                + t.powi(3) * end.x;
            let y = mt.powi(3) * start.y
                + 3.0 * mt * mt * t * c1.y
                + 3.0 * mt * t * t * c2.y
                + t.powi(3) * end.y;
            Point {
                x: x.round(),
                y: y.round(),
            }
        })
        .collect()
}

/// Pause after step `index` of a `len`-point path, slowest mid-path (2-5 ms)
pub fn step_delay(index: usize, len: usize) -> Duration {
    let progress = index as f64 / len.max(1) as f64;
    let ms = (progress * std::f64::consts::PI).sin() * 3.0 + 2.0;
    Duration::from_micros((ms * 1000.0) as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollStep {
    pub y: u32,
    pub pause: Duration,
}

/// Chunked scroll down the page, sometimes followed by a short scroll back
///
/// Empty when the document fits in the viewport.
pub fn scroll_plan<R: Rng + ?Sized>(viewport_height: u32, document_height: u32, rng: &mut R) -> Vec<ScrollStep> {
    if document_height <= viewport_height {
        return Vec::new();
    }

    let total = document_height - viewport_height;
    let chunks = rng.gen_range(3..=7);
    let mut current = 0u32;
    let mut steps = Vec::new();

    for _ in 0..chunks {
        current = (current + rng.gen_range(150..400)).min(total);
        steps.push(ScrollStep {
            y: current,
            pause: Duration::from_millis(rng.gen_range(300..800)),
        });
        if current >= total {
            break;
        }
    }

    if rng.gen::<f64>() > 0.7 {
        current = current.saturating_sub(rng.gen_range(50..250));
        steps.push(ScrollStep {
            y: current,
            pause: Duration::from_millis(rng.gen_range(200..500)),
        });
    }

    steps
}

/// Skim time for a page of `word_count` words
///
/// Reads 20-40% of the words at 3.3-4.2 words per second, capped at five
/// seconds.
pub fn reading_time<R: Rng + ?Sized>(word_count: usize, rng: &mut R) -> Duration {
    let words = word_count as f64 * (rng.gen::<f64>() * 0.2 + 0.2);
    let speed = rng.gen::<f64>() * 0.9 + 3.3;
    Duration::from_secs_f64(words / speed).min(MAX_READING_PAUSE)
}

/// Plays human-like interaction on a page
pub struct HumanBehavior {
    mouse_movement: bool,
    scrolling: bool,
    reading_pause: bool,
    pointer: Point,
    rng: StdRng,
}

impl HumanBehavior {
    pub fn new(config: &StealthConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &StealthConfig, rng: StdRng) -> Self {
        Self {
            mouse_movement: config.mouse_movement,
            scrolling: config.scrolling,
            reading_pause: config.reading_pause,
            pointer: Point { x: 100.0, y: 100.0 },
            rng,
        }
    }

    /// True when at least one behavior is enabled
    pub fn is_enabled(&self) -> bool {
        self.mouse_movement || self.scrolling || self.reading_pause
    }

    async fn move_to<P: Page>(&mut self, page: &mut P, target: Point) -> BrowserResult<()> {
        let path = mouse_path(self.pointer, target, PATH_STEPS, &mut self.rng);
        let len = path.len();

        for (i, point) in path.into_iter().enumerate() {
            page.mouse_move(point.x, point.y).await?;
            tokio::time::sleep(step_delay(i, len)).await;
        }

        self.pointer = target;
        Ok(())
    }

    fn random_point(&mut self, viewport: Viewport) -> Point {
        Point {
            x: self.rng.gen::<f64>() * viewport.width as f64,
            y: self.rng.gen::<f64>() * viewport.height as f64,
        }
    }

    /// Full interaction: settle, point, scroll, read, idle
    pub async fn interact<P: Page>(&mut self, page: &mut P) -> BrowserResult<()> {
        let viewport = page.viewport();

        tokio::time::sleep(Duration::from_millis(self.rng.gen_range(200..500))).await;

        if self.mouse_movement && self.rng.gen::<f64>() > 0.3 {
            let target = Point {
                x: self.rng.gen::<f64>() * viewport.width as f64 * 0.8 + viewport.width as f64 * 0.1,
                y: self.rng.gen::<f64>() * viewport.height as f64 * 0.3 + 100.0,
            };
            self.move_to(page, target).await?;
        }

        if self.scrolling && self.rng.gen::<f64>() > 0.2 {
            let document_height = page.document_height().await?;
            let plan = scroll_plan(viewport.height, document_height, &mut self.rng);
            for step in plan {
                page.scroll_to(step.y).await?;
                tokio::time::sleep(step.pause).await;
            }
        }

        if self.reading_pause {
            let words = page.body_text().await?.split_whitespace().count();
            let pause = reading_time(words, &mut self.rng);
            tracing::trace!("Reading for {}ms ({} words)", pause.as_millis(), words);
            tokio::time::sleep(pause).await;
        }

        if self.mouse_movement && self.rng.gen::<f64>() > 0.6 {
            let moves = self.rng.gen_range(2..=4);
            for _ in 0..moves {
                let target = self.random_point(viewport);
                self.move_to(page, target).await?;
                tokio::time::sleep(Duration::from_millis(self.rng.gen_range(200..700))).await;
            }
        }

        Ok(())
    }
}
