mod helpers;
mod tests_compact;
