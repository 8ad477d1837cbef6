/// Core-set acquisition in embedding space
use candle_core::Tensor;

use super::{check_count, rank_descending, AcquisitionContext, AcquisitionStrategy};
use crate::data::PoolKind;
use crate::{ALError, Result};

/// Pick unlabeled examples far from everything already labeled
///
/// Distance is the squared Euclidean distance between model embeddings. The
/// plain variant ranks candidates by their distance to the nearest labeled
/// example; the greedy variant is k-center: after each pick, distances are
/// updated as if the pick were labeled.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreSet {
    greedy: bool,
}

impl CoreSet {
    pub fn new() -> Self {
        Self { greedy: false }
    }

    pub fn greedy() -> Self {
        Self { greedy: true }
    }
}

/// Embed every member of a pool in eval-sized batches
///
/// Returns the dataset indices and a [n, dim] tensor, or `None` if the pool
/// is empty.
fn embed_pool(ctx: &AcquisitionContext<'_, '_>, kind: PoolKind) -> Result<(Vec<usize>, Option<Tensor>)> {
    let mut loader = ctx.data.loader(kind, ctx.data.eval_batch_size());
    let mut indices = Vec::with_capacity(loader.len());
    let mut chunks = Vec::with_capacity(loader.num_batches());

    while let Some(batch) = loader.next_batch(ctx.data.device())? {
        chunks.push(ctx.model.embed(&batch.inputs)?);
        indices.extend_from_slice(&batch.indices);
    }

    if chunks.is_empty() {
        return Ok((indices, None));
    }
    Ok((indices, Some(Tensor::cat(&chunks, 0)?)))
}

/// Squared distance from each row of `points` to its nearest row in `centers`
fn nearest_distances(points: &Tensor, centers: &Tensor, chunk: usize) -> Result<Vec<f32>> {
    let (n, _) = points.dims2()?;
    let center_norms = centers.sqr()?.sum_keepdim(1)?.t()?;
    let centers_t = centers.t()?.contiguous()?;

    let mut distances = Vec::with_capacity(n);
    let mut start = 0;
    while start < n {
        let len = chunk.min(n - start);
        let block = points.narrow(0, start, len)?;
        let norms = block.sqr()?.sum_keepdim(1)?;
        let cross = block.matmul(&centers_t)?;

        // |a|^2 + |b|^2 - 2ab, clamped at zero against rounding
        let d = norms
            .broadcast_add(&center_norms)?
            .sub(&(cross * 2.0)?)?
            .relu()?
            .min(1)?;
        distances.extend(d.to_vec1::<f32>()?);
        start += len;
    }

    Ok(distances)
}

/// Squared distance from each row of `points` to `center` [1, dim]
fn distances_to(points: &Tensor, center: &Tensor) -> Result<Vec<f32>> {
    Ok(points
        .broadcast_sub(center)?
        .sqr()?
        .sum(1)?
        .to_vec1::<f32>()?)
}

/// Position of the first maximum
fn first_max(values: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (pos, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(pos),
        }
    }
    best
}

impl AcquisitionStrategy for CoreSet {
    fn name(&self) -> &'static str {
        if self.greedy {
            "core-set-greedy"
        } else {
            "core-set"
        }
    }

    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>> {
        if !ctx.model.supports_embedding() {
            return Err(ALError::UnsupportedModel("embedding"));
        }
        check_count(ctx, count)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let (indices, unlabeled) = embed_pool(ctx, PoolKind::Unlabeled)?;
        let Some(unlabeled) = unlabeled else {
            return Ok(Vec::new());
        };
        let (_, labeled) = embed_pool(ctx, PoolKind::Labeled)?;

        let mut distances = match &labeled {
            Some(labeled) => nearest_distances(&unlabeled, labeled, ctx.data.eval_batch_size())?,
            None => vec![f32::INFINITY; indices.len()],
        };

        if !self.greedy {
            return Ok(rank_descending(&distances)
                .into_iter()
                .take(count)
                .map(|pos| indices[pos])
                .collect());
        }

        let mut picks = Vec::with_capacity(count);
        while picks.len() < count {
            let Some(pos) = first_max(&distances) else {
                break;
            };
            picks.push(indices[pos]);
            distances[pos] = f32::NEG_INFINITY;

            let center = unlabeled.narrow(0, pos, 1)?;
            for (d, new) in distances.iter_mut().zip(distances_to(&unlabeled, &center)?) {
                if *d > new {
                    *d = new;
                }
            }
        }

        Ok(picks)
    }
}
