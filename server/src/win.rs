use shared::{Role, Team};

/// Decides whether the match is over given the roles of everyone still alive.
///
/// Checks run in a fixed order and the first hit wins:
/// 1. a lone surviving Renegade wins outright
/// 2. no living Sheriff hands the win to the Outlaws
/// 3. no living Outlaw or Renegade hands the win to the Sheriff
///
/// Rule 1 must precede rule 2: with only the Renegade left the Sheriff is
/// necessarily dead as well.
pub fn evaluate(alive_roles: &[Role]) -> Option<Team> {
    if let [Role::Renegade] = alive_roles {
        return Some(Team::Renegade);
    }

    if !alive_roles.contains(&Role::Sheriff) {
        return Some(Team::Outlaws);
    }

    if !alive_roles.contains(&Role::Outlaw) && !alive_roles.contains(&Role::Renegade) {
        return Some(Team::Sheriff);
    }

    None
}
