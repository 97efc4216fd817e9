automod::dir!(pub "src/host");
