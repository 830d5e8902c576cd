use super::{command::CommandRequest, snapshot::WorkPosition, state::IntendedState};
use crate::core::JogButton;

/// Corrective commands for every jog field where the device disagrees with
/// what this process last wrote, one per mismatched field.
pub fn reconcile(intent: IntendedState, observed: &WorkPosition) -> Vec<CommandRequest> {
    let mut commands = Vec::new();
    if observed.up != intent.up {
        commands.push(CommandRequest::Jog {
            button: JogButton::Up,
            pressed: intent.up,
        });
    }
    if observed.down != intent.down {
        commands.push(CommandRequest::Jog {
            button: JogButton::Down,
            pressed: intent.down,
        });
    }
    if observed.speed_mode != intent.speed_mode {
        commands.push(CommandRequest::SetSpeedMode(intent.speed_mode));
    }
    commands
}
