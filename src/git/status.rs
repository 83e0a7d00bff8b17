// ABOUTME: Parses `git status --porcelain=v1` output into change counts

/// Counts derived from porcelain entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub staged: u32,
    pub modified: u32,
    pub untracked: u32,
}

/// Count staged, modified and untracked paths.
///
/// Each line is `XY <path>` where X is the index column and Y the worktree column.
/// A path can count in more than one bucket (`MM` is both staged and modified).
pub fn parse_porcelain(output: &str) -> ChangeCounts {
    let mut counts = ChangeCounts::default();

    for line in output.lines() {
        let mut codes = line.chars();
        let (Some(index), Some(worktree)) = (codes.next(), codes.next()) else {
            continue;
        };

        match (index, worktree) {
            ('?', '?') => counts.untracked += 1,
            ('!', '!') => {}
            _ => {
                if index != ' ' {
                    counts.staged += 1;
                }
                if matches!(worktree, 'M' | 'D') {
                    counts.modified += 1;
                }
            }
        }
    }

    counts
}
