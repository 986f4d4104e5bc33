// Length-limited code lengths via package-merge
// https://create.stephan-brumme.com/length-limited-prefix-codes/#package-merge

/// Code lengths for `weights`, sorted ascending, no code longer than `max_len`.
///
/// The caller guarantees a non-empty input with `weights.len() <= 1 << max_len`,
/// and that the sum of all weights fits in a u64.
pub fn package_merge_sorted(weights: &[u64], max_len: u8) -> Vec<u8> {
    assert!(!weights.is_empty(), "Weights cannot be empty");
    assert!(max_len <= 32, "Max length is too big");
    assert!((weights.len() as u64) <= 1 << max_len, "Max length is too small");
    debug_assert!(weights.windows(2).all(|w| w[0] <= w[1]), "Weights must be sorted");

    // bit `depth` of package_depths[i] is set if item i of that depth's list is a package
    let mut package_depths: Vec<u32> = vec![0; weights.len() * 2 - 1];
    let mut prev: Vec<u64> = weights.to_vec();

    for depth in 1..max_len {
        let mask = 1 << depth;
        let mut seq = weights.iter().copied().peekable();
        let mut packages = prev.chunks_exact(2).map(|x| x[0].saturating_add(x[1])).peekable();
        let mut curr = Vec::with_capacity(weights.len() + prev.len() / 2);

        // merge packages with the original sequence, originals win ties
        loop {
            let take_package = match (seq.peek(), packages.peek()) {
                (None, None) => break,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some(a), Some(b)) => a > b,
            };
            let item = if take_package { packages.next() } else { seq.next() };
            if take_package {
                package_depths[curr.len()] |= mask;
            }
            curr.extend(item);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    // walk back from the 2n - 2 cheapest items of the last list
    let mut code_lens = vec![0; weights.len()];
    let mut relevant = weights.len() * 2 - 2;
    for depth in (0..max_len).rev() {
        if relevant == 0 {
            break;
        }
        let mask = 1 << depth;
        let mut packaged = 0;
        for item in 0..relevant {
            if package_depths[item] & mask == 0 {
                code_lens[item - packaged] += 1;
            } else {
                packaged += 1;
            }
        }
        relevant = packaged * 2;
    }
    code_lens
}

/// Canonical codes for per-symbol `code_lens`.
///
/// Codes of equal length are consecutive and follow symbol order, shorter
/// codes come first. Returns `(code, len)` per symbol.
pub fn canonical(code_lens: &[u8]) -> Vec<(u64, u8)> {
    let max_len = code_lens.iter().copied().max().unwrap_or(0);
    let mut next_code = first_codes(code_lens, max_len);
    code_lens
        .iter()
        .map(|&len| {
            let len_idx = usize::from(len);
            let code = next_code[len_idx];
            next_code[len_idx] += 1;
            (code, len)
        })
        .collect()
}

/// Number of codes per length, indexed 0..=max_len
pub fn length_counts(code_lens: &[u8], max_len: u8) -> Vec<u64> {
    let mut counts = vec![0; usize::from(max_len) + 1];
    for &len in code_lens {
        counts[usize::from(len)] += 1;
    }
    counts
}

/// First canonical code of every length, indexed 0..=max_len
pub fn first_codes(code_lens: &[u8], max_len: u8) -> Vec<u64> {
    let counts = length_counts(code_lens, max_len);
    let mut first = vec![0; usize::from(max_len) + 1];
    let mut code = 0;
    for len in 1..first.len() {
        // zero length codes only exist in single symbol tables
        let shorter = if len == 1 { 0 } else { counts[len - 1] };
        code = (code + shorter) << 1;
        first[len] = code;
    }
    first
}
