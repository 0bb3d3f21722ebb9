// Mirrors the DDL generated by `db::create_tables_sql`.

diesel::table! {
    hosts (id) {
        id -> Integer,
        name -> Text,
        created_at -> BigInt,
    }
}

diesel::table! {
    listings (id) {
        id -> Integer,
        host_id -> Nullable<Integer>,
        property_type -> Text,
        room_type -> Text,
        accommodates -> Double,
        bathrooms -> Double,
        bed_type -> Text,
        cancellation_policy -> Text,
        cleaning_fee -> Bool,
        city -> Text,
        instant_bookable -> Bool,
        number_of_reviews -> Double,
        review_scores_rating -> Double,
        bedrooms -> Double,
        beds -> Double,
        created_at -> BigInt,
    }
}

diesel::joinable!(listings -> hosts (host_id));

diesel::allow_tables_to_appear_in_same_query!(
    hosts,
    listings,
);
