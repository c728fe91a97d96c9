mod support;

mod test_quota_resolver;
