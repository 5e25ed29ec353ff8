//! Wordmark and startup animation.

use crate::session::Motion;

/// Final wordmark.
pub const LOGO: &str = "▌fleetdeck▐";

const STEPS: usize = 4;

/// Logo frames for the startup animation. A single final frame when motion
/// is reduced.
pub fn startup_frames(motion: Motion) -> Vec<String> {
    if !motion.animations || motion.reduced_motion {
        return vec![LOGO.to_string()];
    }
    let chars: Vec<char> = LOGO.chars().collect();
    (1..=STEPS)
        .map(|step| {
            let shown = chars.len() * step / STEPS;
            let mut frame: String = chars[..shown].iter().collect();
            frame.extend(std::iter::repeat_n('·', chars.len() - shown));
            frame
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animation_ends_on_logo() {
        let frames = startup_frames(Motion::new(false));
        assert_eq!(frames.len(), STEPS);
        assert_eq!(frames.last().map(String::as_str), Some(LOGO));
        assert!(frames[0].contains('·'));
    }

    #[test]
    fn test_reduced_motion_single_frame() {
        assert_eq!(startup_frames(Motion::new(true)), vec![LOGO.to_string()]);
    }
}
