mod contention_test;
mod lifecycle_test;
mod txn_test;
mod watch_test;
