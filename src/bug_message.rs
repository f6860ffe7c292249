pub(crate) const BUG_MESSAGE: &str = "\
    [BUG] Please report this issue. Provide details about the place \
    where the problem occurred and the conditions under which it happened. \
    Thank you for helping us make chorus better!";
