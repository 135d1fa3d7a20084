// ============================================
// Sparse Ratings Matrix (CSR)
// ============================================
//
// Rows are users, columns are items. Only non-zero ratings are stored; an
// unset cell reads as 0 on this path.

use super::mapper::IdMapper;
use crate::error::{RecommenderError, Result};
use crate::models::RatingObservation;
use sprs::{CsMat, CsVecView, TriMat};
use std::collections::BTreeMap;

/// Users x items ratings plus the id mappers that address it.
#[derive(Debug, Clone)]
pub struct SparseRatingsMatrix {
    ratings: CsMat<f64>,
    users: IdMapper,
    items: IdMapper,
}

impl SparseRatingsMatrix {
    /// Build from observations.
    ///
    /// Columns cover `item_ids` plus every observed item; both users and
    /// items get ordinals in ascending id order. Repeated (user, item) pairs
    /// keep the last rating; zero ratings are not stored.
    pub fn from_observations(
        item_ids: impl IntoIterator<Item = i64>,
        observations: &[RatingObservation],
    ) -> Result<Self> {
        if let Some(bad) = observations.iter().find(|o| !o.rating.is_finite()) {
            return Err(RecommenderError::InvalidInput(format!(
                "rating for user {} item {} is not finite",
                bad.user_id, bad.item_id
            )));
        }

        let mut all_items: Vec<i64> = item_ids.into_iter().collect();
        all_items.extend(observations.iter().map(|o| o.item_id));
        all_items.sort_unstable();
        all_items.dedup();

        let mut user_ids: Vec<i64> = observations.iter().map(|o| o.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let items = IdMapper::from_ids(all_items);
        let users = IdMapper::from_ids(user_ids);

        // TriMat sums duplicates, so collapse repeated pairs first
        let mut cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for obs in observations {
            // Both ids were inserted above
            if let (Some(row), Some(col)) = (users.ordinal(obs.user_id), items.ordinal(obs.item_id))
            {
                cells.insert((row, col), obs.rating);
            }
        }

        let mut triplets = TriMat::with_capacity((users.len(), items.len()), cells.len());
        for ((row, col), rating) in cells {
            if rating != 0.0 {
                triplets.add_triplet(row, col, rating);
            }
        }
        let ratings: CsMat<f64> = triplets.to_csr();

        Ok(Self {
            ratings,
            users,
            items,
        })
    }

    pub fn ratings(&self) -> &CsMat<f64> {
        &self.ratings
    }

    pub fn users(&self) -> &IdMapper {
        &self.users
    }

    pub fn items(&self) -> &IdMapper {
        &self.items
    }

    pub fn n_users(&self) -> usize {
        self.ratings.rows()
    }

    pub fn n_items(&self) -> usize {
        self.ratings.cols()
    }

    pub fn row_of(&self, user_id: i64) -> Result<usize> {
        self.users
            .ordinal(user_id)
            .ok_or(RecommenderError::UnknownUser(user_id))
    }

    fn row_view(&self, user_id: i64) -> Result<CsVecView<'_, f64>> {
        let row = self.row_of(user_id)?;
        self.ratings.outer_view(row).ok_or_else(|| {
            RecommenderError::Internal(format!("user {} maps to missing row {}", user_id, row))
        })
    }

    /// Dense row for `user_id`, zeros for unrated items.
    pub fn dense_row(&self, user_id: i64) -> Result<Vec<f64>> {
        let mut dense = vec![0.0; self.n_items()];
        fill_dense(self.row_view(user_id)?, &mut dense);
        Ok(dense)
    }

    /// Stored ratings of a user as (item ordinal, rating), ordinal order.
    pub fn rated_items(&self, user_id: i64) -> Result<Vec<(usize, f64)>> {
        Ok(self
            .row_view(user_id)?
            .iter()
            .map(|(col, &rating)| (col, rating))
            .collect())
    }

    /// Dense row for a ratings map, plus ids the item mapper does not know.
    pub fn build_row<'a>(
        &self,
        ratings: impl IntoIterator<Item = (&'a i64, &'a f64)>,
    ) -> (Vec<f64>, Vec<i64>) {
        let mut row = vec![0.0; self.n_items()];
        let mut ignored = Vec::new();
        for (&item_id, &rating) in ratings {
            match self.items.ordinal(item_id) {
                Some(col) => row[col] = rating,
                None => ignored.push(item_id),
            }
        }
        ignored.sort_unstable();
        (row, ignored)
    }

    /// Append a new user row; returns the assigned user id.
    pub fn append_user(&mut self, dense: &[f64]) -> Result<i64> {
        self.check_width(dense)?;
        let user_id = self.users.next_id()?;

        let (indices, data): (Vec<usize>, Vec<f64>) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(col, v)| (col, *v))
            .unzip();
        let nnz = indices.len();
        let row = CsMat::try_new((1, self.n_items()), vec![0, nnz], indices, data)
            .map_err(|(_, _, _, e)| RecommenderError::Internal(format!("invalid user row: {}", e)))?;

        self.ratings = sprs::vstack(&[self.ratings.view(), row.view()]);
        self.users.insert(user_id);
        Ok(user_id)
    }

    /// Overwrite an existing user row.
    pub fn overwrite_user(&mut self, user_id: i64, dense: &[f64]) -> Result<()> {
        let target = self.row_of(user_id)?;
        self.check_width(dense)?;

        let shape = (self.n_users(), self.n_items());
        let mut triplets = TriMat::with_capacity(shape, self.ratings.nnz() + dense.len());
        for (row, vec) in self.ratings.outer_iterator().enumerate() {
            if row == target {
                continue;
            }
            for (col, &rating) in vec.iter() {
                triplets.add_triplet(row, col, rating);
            }
        }
        for (col, &rating) in dense.iter().enumerate() {
            if rating != 0.0 {
                triplets.add_triplet(target, col, rating);
            }
        }

        self.ratings = triplets.to_csr();
        Ok(())
    }

    fn check_width(&self, dense: &[f64]) -> Result<()> {
        if dense.len() != self.n_items() {
            return Err(RecommenderError::InvalidInput(format!(
                "row has {} cells, matrix has {} items",
                dense.len(),
                self.n_items()
            )));
        }
        Ok(())
    }
}

/// Overwrite `buf` with a sparse row, zeros for unset cells.
pub(crate) fn fill_dense(row: CsVecView<'_, f64>, buf: &mut [f64]) {
    buf.iter_mut().for_each(|v| *v = 0.0);
    for (col, &value) in row.iter() {
        if let Some(slot) = buf.get_mut(col) {
            *slot = value;
        }
    }
}

/// First stored value that is not finite, as (row, column).
pub(crate) fn first_non_finite(matrix: &CsMat<f64>) -> Option<(usize, usize)> {
    matrix
        .outer_iterator()
        .enumerate()
        .find_map(|(row, vec)| {
            vec.iter()
                .find(|(_, v)| !v.is_finite())
                .map(|(col, _)| (row, col))
        })
}
