// Kept in sync with DatabaseStore::init_schema by hand.

diesel::table! {
    datadump (id) {
        id -> Integer,
        url -> Text,
        service -> Text,
        method -> Text,
        request_header -> Nullable<Text>,
        response_body -> Nullable<Text>,
        response_header -> Nullable<Text>,
        parsed -> Bool,
        created_at -> Text,
    }
}
