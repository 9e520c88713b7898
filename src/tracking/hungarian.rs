//! 匈牙利算法 (Kuhn-Munkres) 最优分配
//!
//! 代价矩阵行 = 轨迹, 列 = 检测。代价超过阈值的配对视为不可匹配。

use ndarray::Array2;

/// 超过阈值的代价统一替换成该值, 保证求解过程数值稳定
const INFEASIBLE: f64 = 1.0e6;

/// 分配结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// (行, 列) 配对
    pub matches: Vec<(usize, usize)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

/// 带阈值的线性分配
pub fn linear_assignment(cost: &Array2<f32>, thresh: f32) -> Assignment {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Assignment {
            matches: Vec::new(),
            unmatched_rows: (0..rows).collect(),
            unmatched_cols: (0..cols).collect(),
        };
    }

    let gated = cost.mapv(|c| {
        if c.is_nan() || c > thresh {
            INFEASIBLE
        } else {
            c as f64
        }
    });

    let row_to_col = solve(&gated);

    let mut matches = Vec::new();
    let mut col_used = vec![false; cols];
    let mut unmatched_rows = Vec::new();
    for (row, col) in row_to_col.into_iter().enumerate() {
        match col {
            Some(col) if gated[[row, col]] < INFEASIBLE => {
                matches.push((row, col));
                col_used[col] = true;
            }
            _ => unmatched_rows.push(row),
        }
    }
    let unmatched_cols = (0..cols).filter(|&c| !col_used[c]).collect();

    Assignment {
        matches,
        unmatched_rows,
        unmatched_cols,
    }
}

/// 最小代价完全分配, 返回每一行分配到的列 (行数多于列数时部分行为 None)
pub fn solve(cost: &Array2<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }

    // 算法要求 行数 <= 列数, 否则转置求解
    if rows > cols {
        let transposed = cost.t().to_owned();
        let col_to_row = solve(&transposed);
        let mut row_to_col = vec![None; rows];
        for (col, row) in col_to_row.into_iter().enumerate() {
            if let Some(row) = row {
                row_to_col[row] = Some(col);
            }
        }
        return row_to_col;
    }

    let n = rows;
    let m = cols;
    // 势函数, 1-based, 下标0为哨兵
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    // p[j]: 第j列匹配的行 (0 = 未匹配)
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost[[i0 - 1, j - 1]] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // 沿增广路回溯
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![None; n];
    for j in 1..=m {
        if p[j] != 0 {
            row_to_col[p[j] - 1] = Some(j - 1);
        }
    }
    row_to_col
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn total(cost: &Array2<f64>, assignment: &[Option<usize>]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .filter_map(|(r, c)| c.map(|c| cost[[r, c]]))
            .sum()
    }

    #[test]
    fn test_square_optimum() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let result = solve(&cost);
        assert_eq!(result, vec![Some(1), Some(0), Some(2)]);
        assert_eq!(total(&cost, &result), 5.0);
    }

    #[test]
    fn test_beats_greedy() {
        // 贪心会先取 (0,0)=0.1, 然后被迫取 (1,1)=0.9; 最优为 0.2 + 0.3
        let cost = array![[0.1, 0.2], [0.3, 0.9]];
        let result = solve(&cost);
        assert_eq!(result, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_more_cols_than_rows() {
        let cost = array![[5.0, 1.0, 9.0, 3.0], [2.0, 8.0, 1.5, 7.0]];
        let result = solve(&cost);
        assert_eq!(result, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_more_rows_than_cols() {
        let cost = array![[5.0, 1.0], [2.0, 8.0], [0.5, 0.7]];
        let result = solve(&cost);
        assert_eq!(result.iter().filter(|c| c.is_some()).count(), 2);
        assert_eq!(total(&cost, &result), 1.5);
    }

    #[test]
    fn test_threshold_rejects_pairs() {
        let cost = array![[0.1f32, 0.95], [0.9, 0.85]];
        let a = linear_assignment(&cost, 0.8);
        assert_eq!(a.matches, vec![(0, 0)]);
        assert_eq!(a.unmatched_rows, vec![1]);
        assert_eq!(a.unmatched_cols, vec![1]);
    }

    #[test]
    fn test_empty_inputs() {
        let cost = Array2::<f32>::zeros((0, 3));
        let a = linear_assignment(&cost, 0.5);
        assert!(a.matches.is_empty());
        assert_eq!(a.unmatched_cols, vec![0, 1, 2]);

        let cost = Array2::<f32>::zeros((2, 0));
        let a = linear_assignment(&cost, 0.5);
        assert_eq!(a.unmatched_rows, vec![0, 1]);
    }

    #[test]
    fn test_nan_is_infeasible() {
        let cost = array![[f32::NAN, 0.2]];
        let a = linear_assignment(&cost, 0.5);
        assert_eq!(a.matches, vec![(0, 1)]);
        assert_eq!(a.unmatched_cols, vec![0]);
    }
}
